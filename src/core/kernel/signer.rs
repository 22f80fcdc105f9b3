use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 over the canonical query string.
#[must_use]
pub fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Canonical query string: url-encoded keys and values joined with `&`,
/// in insertion order, without a leading `?`.
///
/// Iteration order is load-bearing: the signature is computed over this
/// exact string.
#[must_use]
pub fn canonical_query<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Query string as it appears in the request URL: `?`-prefixed, or empty
/// when the parameter set is empty.
#[must_use]
pub fn make_query_string<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let canonical = canonical_query(params);
    if canonical.is_empty() {
        canonical
    } else {
        format!("?{canonical}")
    }
}

/// Inverse of [`make_query_string`]; tolerates a leading `?`.
#[must_use]
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    let trimmed = query.trim_start_matches('?');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('&')
        .filter_map(|pair| {
            pair.split_once('=').map(|(k, v)| {
                (
                    urlencoding::decode(k).map_or_else(|_| k.to_string(), |s| s.into_owned()),
                    urlencoding::decode(v).map_or_else(|_| v.to_string(), |s| s.into_owned()),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_params_build_empty_string() {
        assert_eq!(make_query_string(std::iter::empty()), "");
        assert_eq!(canonical_query(std::iter::empty()), "");
    }

    #[test]
    fn query_string_round_trips() {
        let params = vec![
            ("symbol", "ETHBTC"),
            ("type", "LIMIT_MAKER"),
            ("note", "a b&c=d"),
        ];
        let built = make_query_string(params.clone());
        assert!(built.starts_with('?'));
        let parsed = parse_query_string(&built);
        let expected: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let built = canonical_query(vec![("b", "2"), ("a", "1"), ("c", "3")]);
        assert_eq!(built, "b=2&a=1&c=3");
    }

    #[test]
    fn signature_is_deterministic_and_sensitive() {
        let query = "symbol=ETHBTC&timestamp=1508558157118";
        let first = generate_signature("secret", query);
        let second = generate_signature("secret", query);
        assert_eq!(first, second);

        let tampered = generate_signature("secret", "symbol=ETHBTC&timestamp=1508558157119");
        assert_ne!(first, tampered);
        let other_key = generate_signature("secret2", query);
        assert_ne!(first, other_key);
    }

    #[test]
    fn signature_matches_known_vector() {
        // Vector from the exchange's signed-endpoint documentation.
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            generate_signature(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }
}
