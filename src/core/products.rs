//! Product-line routing: every call and stream belongs to exactly one
//! product, and each product carries its own REST/WebSocket host pair.

/// Binance product lines served by this client.
///
/// Selected once at call-site construction; hosts and listen-key endpoint
/// paths hang off the variant instead of being re-derived per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    Spot,
    Margin,
    Futures,
    Delivery,
}

const SPOT_REST: &str = "https://api.binance.com";
const FUTURES_REST: &str = "https://fapi.binance.com";
const DELIVERY_REST: &str = "https://dapi.binance.com";
const PORTFOLIO_REST: &str = "https://papi.binance.com";

const SPOT_REST_TESTNET: &str = "https://testnet.binance.vision";
const FUTURES_REST_TESTNET: &str = "https://testnet.binancefuture.com";

const SPOT_WS: &str = "wss://stream.binance.com:9443";
const FUTURES_WS: &str = "wss://fstream.binance.com";
const DELIVERY_WS: &str = "wss://dstream.binance.com";

const SPOT_WS_TESTNET: &str = "wss://testnet.binance.vision";
const FUTURES_WS_TESTNET: &str = "wss://stream.binancefuture.com";
const DELIVERY_WS_TESTNET: &str = "wss://dstream.binancefuture.com";

impl Product {
    /// Default REST base host for this product.
    pub fn rest_base(self, testnet: bool) -> &'static str {
        if testnet {
            return match self {
                Self::Spot | Self::Margin => SPOT_REST_TESTNET,
                Self::Futures | Self::Delivery => FUTURES_REST_TESTNET,
            };
        }
        match self {
            Self::Spot | Self::Margin => SPOT_REST,
            Self::Futures => FUTURES_REST,
            Self::Delivery => DELIVERY_REST,
        }
    }

    /// Default WebSocket base host for this product.
    pub fn ws_base(self, testnet: bool) -> &'static str {
        if testnet {
            return match self {
                Self::Spot | Self::Margin => SPOT_WS_TESTNET,
                Self::Futures => FUTURES_WS_TESTNET,
                Self::Delivery => DELIVERY_WS_TESTNET,
            };
        }
        match self {
            Self::Spot | Self::Margin => SPOT_WS,
            Self::Futures => FUTURES_WS,
            Self::Delivery => DELIVERY_WS,
        }
    }

    /// REST path of the listen-key resource for this product.
    ///
    /// Spot and margin speak `userDataStream`, the derivatives lines call
    /// the same resource `listenKey`.
    pub const fn listen_key_path(self) -> &'static str {
        match self {
            Self::Spot => "/api/v3/userDataStream",
            Self::Margin => "/sapi/v1/userDataStream",
            Self::Futures => "/fapi/v1/listenKey",
            Self::Delivery => "/dapi/v1/listenKey",
        }
    }

    /// REST path of the server-time endpoint for this product.
    pub fn server_time_path(self) -> &'static str {
        match self {
            Self::Spot | Self::Margin => "/api/v3/time",
            Self::Futures => "/fapi/v1/time",
            Self::Delivery => "/dapi/v1/time",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Margin => "margin",
            Self::Futures => "futures",
            Self::Delivery => "delivery",
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the REST host for a path, honoring derivatives path prefixes.
///
/// `/fapi`, `/dapi` and `/papi` paths route to their dedicated hosts even
/// when dispatched from a spot-configured client; everything else
/// (`/api`, `/sapi`, `/wapi`) lives on the spot host.
pub fn rest_host_for_path(path: &str, testnet: bool) -> &'static str {
    if path.starts_with("/fapi") {
        Product::Futures.rest_base(testnet)
    } else if path.starts_with("/dapi") {
        Product::Delivery.rest_base(testnet)
    } else if path.starts_with("/papi") {
        if testnet {
            SPOT_REST_TESTNET
        } else {
            PORTFOLIO_REST
        }
    } else {
        Product::Spot.rest_base(testnet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prefix_routing() {
        assert_eq!(rest_host_for_path("/api/v3/depth", false), SPOT_REST);
        assert_eq!(rest_host_for_path("/sapi/v1/userDataStream", false), SPOT_REST);
        assert_eq!(rest_host_for_path("/fapi/v1/time", false), FUTURES_REST);
        assert_eq!(rest_host_for_path("/dapi/v1/time", false), DELIVERY_REST);
        assert_eq!(rest_host_for_path("/papi/v1/balance", false), PORTFOLIO_REST);
    }

    #[test]
    fn testnet_overrides_every_prefix() {
        assert_eq!(rest_host_for_path("/api/v3/depth", true), SPOT_REST_TESTNET);
        assert_eq!(
            rest_host_for_path("/fapi/v1/time", true),
            FUTURES_REST_TESTNET
        );
    }

    #[test]
    fn products_have_distinct_ws_hosts() {
        assert_ne!(
            Product::Spot.ws_base(false),
            Product::Futures.ws_base(false)
        );
        assert_ne!(
            Product::Futures.ws_base(false),
            Product::Delivery.ws_base(false)
        );
    }

    #[test]
    fn listen_key_paths_per_product() {
        assert_eq!(Product::Spot.listen_key_path(), "/api/v3/userDataStream");
        assert_eq!(Product::Margin.listen_key_path(), "/sapi/v1/userDataStream");
        assert_eq!(Product::Futures.listen_key_path(), "/fapi/v1/listenKey");
        assert_eq!(Product::Delivery.listen_key_path(), "/dapi/v1/listenKey");
    }
}
