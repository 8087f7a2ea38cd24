use crate::{config::NetworkMode, errors::CaError};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use zeroize::Zeroizing;

pub(super) fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Missing values come back empty; the keystore names the field when it rejects them.
pub(super) fn secret_str(args: &Value, key: &str) -> Zeroizing<String> {
    Zeroizing::new(
        args.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    )
}

pub(super) fn secret_arg(args: &Value, key: &str) -> SecretString {
    SecretString::new(secret_str(args, key).as_str().into())
}

pub(super) fn network_arg(args: &Value) -> Result<Option<NetworkMode>, CaError> {
    get_str(args, "network")
        .map(|s| {
            NetworkMode::parse(s)
                .ok_or_else(|| CaError::InvalidArgument(format!("unknown network: {s}")))
        })
        .transpose()
}

pub(super) fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, CaError> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| CaError::InvalidArgument(format!("{tool}: {e}")))
}
