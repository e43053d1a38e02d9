//! JSON-encoded variable maps.
//!
//! The server stores generic and runtime variables as JSON object strings and
//! reports an unset map as `"{}"`. Decoding against the previous value keeps an
//! absent map absent instead of turning it into an empty one.

use tracing::warn;

use super::attr::Attr;
use super::record::VarMap;

/// Canonical encoding of an absent map.
pub const EMPTY_OBJECT: &str = "{}";

/// Encodes a variable map for the wire.
#[must_use]
pub fn encode(map: &Attr<VarMap>) -> String {
    match map {
        Attr::Value(values) => {
            serde_json::to_string(values).unwrap_or_else(|_| EMPTY_OBJECT.to_string())
        }
        Attr::Unset | Attr::Null => EMPTY_OBJECT.to_string(),
    }
}

/// Decodes a variable map read from the server.
///
/// Malformed JSON is treated as an empty map. An empty map decodes to
/// [`Attr::Null`] when `previous` was never set.
#[must_use]
pub fn decode(json: &str, previous: &Attr<VarMap>) -> Attr<VarMap> {
    let values = if json.trim().is_empty() {
        VarMap::new()
    } else {
        serde_json::from_str::<VarMap>(json).unwrap_or_else(|e| {
            warn!("Ignoring malformed variable document from server: {e}");
            VarMap::new()
        })
    };

    if values.is_empty() && previous.is_absent() {
        Attr::Null
    } else {
        Attr::Value(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> VarMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_encode_absent_is_empty_object() {
        assert_eq!(encode(&Attr::Null), "{}");
        assert_eq!(encode(&Attr::Unset), "{}");
    }

    #[test]
    fn test_encode_sorted_keys() {
        let encoded = encode(&Attr::Value(map(&[("b", "2"), ("a", "1")])));
        assert_eq!(encoded, r#"{"a":"1","b":"2"}"#);
    }

    #[test]
    fn test_empty_stays_null_when_never_set() {
        assert_eq!(decode("{}", &Attr::Null), Attr::Null);
        assert_eq!(decode("{}", &Attr::Unset), Attr::Null);
    }

    #[test]
    fn test_explicit_empty_stays_empty() {
        assert_eq!(
            decode("{}", &Attr::Value(VarMap::new())),
            Attr::Value(VarMap::new())
        );
    }

    #[test]
    fn test_server_values_win() {
        let decoded = decode(r#"{"region":"eu"}"#, &Attr::Null);
        assert_eq!(decoded, Attr::Value(map(&[("region", "eu")])));
    }

    #[test]
    fn test_malformed_is_empty() {
        assert_eq!(decode("not json", &Attr::Null), Attr::Null);
        assert_eq!(
            decode("[1,2]", &Attr::Value(map(&[("a", "1")]))),
            Attr::Value(VarMap::new())
        );
        assert_eq!(decode("", &Attr::Null), Attr::Null);
    }
}
