use serde::Serialize;

pub struct Masked;

pub trait MaskPolicy {
    fn mask(value: &str) -> String;
}

impl MaskPolicy for Masked {
    fn mask(value: &str) -> String {
        let len = value.chars().count();
        if len > 4 {
            let tail: String = value.chars().skip(len - 4).collect();
            "*".repeat(len - 4) + &tail
        } else {
            value.to_string()
        }
    }
}

/// Return true if a key name likely holds a payer MSISDN.
fn is_phone_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k.contains("phone") || k == "partya" || k == "msisdn"
}

/// Return true if a key name holds a credential that must never reach the logs.
fn is_secret_key(key: &str) -> bool {
    let k = key.to_lowercase();
    k.contains("password") || k.contains("passkey") || k.contains("token") || k.contains("secret")
}

pub fn secure_serializable(v: impl Serialize) -> serde_json::Value {
    match serde_json::to_value(v) {
        Ok(value) => secure_value(&value),
        Err(_) => serde_json::Value::Null,
    }
}

pub fn secure_value(v: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match v {
        Value::Object(map) => {
            // Callback metadata comes as `{"Name": "PhoneNumber", "Value": 2547..}` pairs
            let named_phone = map
                .get("Name")
                .and_then(Value::as_str)
                .is_some_and(is_phone_key);
            let mut new = serde_json::Map::with_capacity(map.len());
            for (k, val) in map {
                let is_phone = is_phone_key(k) || (named_phone && k == "Value");
                let is_secret = is_secret_key(k);
                let new_val = match val {
                    Value::String(_) | Value::Number(_) if is_secret => {
                        Value::String("***".to_string())
                    }
                    Value::String(s) if is_phone => Value::String(Masked::mask(s)),
                    Value::Number(n) if is_phone => Value::String(Masked::mask(&n.to_string())),
                    _ => secure_value(val),
                };
                new.insert(k.clone(), new_val);
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(secure_value).collect()),
        other => other.clone(),
    }
}
