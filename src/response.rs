use serde::Serialize;

/// Success envelope: `{status: "success", token?, results?, data?, message?}`.
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Success<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: "success",
            token: None,
            results: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_token(token: String, data: T) -> Self {
        Self {
            token: Some(token),
            ..Self::data(data)
        }
    }
}

impl<T: Serialize> Success<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        Self {
            results: Some(items.len()),
            ..Self::data(items)
        }
    }
}

impl Success<()> {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            status: "success",
            token: None,
            results: None,
            data: None,
            message: Some(msg.into()),
        }
    }
}
