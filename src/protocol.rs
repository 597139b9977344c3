use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct ResponseOk<T: Serialize> {
    pub id: String,
    pub result: T,
}

#[derive(Debug, Serialize)]
pub struct ResponseErr {
    pub id: String,
    pub error: String,
}

pub fn ok<T: Serialize>(id: &str, result: T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(ResponseOk {
        id: id.to_string(),
        result,
    })?)
}

pub fn err(id: &str, error: impl Into<String>) -> Value {
    // ResponseErr only holds strings, serialization cannot fail.
    serde_json::to_value(ResponseErr {
        id: id.to_string(),
        error: error.into(),
    })
    .unwrap_or(Value::Null)
}
