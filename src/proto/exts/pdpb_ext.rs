use crate::proto::pdpb::Error;
use crate::proto::pdpb::ErrorType;
use crate::proto::pdpb::RequestHeader;
use crate::proto::pdpb::ResponseHeader;

impl RequestHeader {
    /// Header correlating a call with the cluster it targets
    pub fn new(cluster_id: u64) -> Self {
        Self { cluster_id }
    }
}

impl ResponseHeader {
    /// Generate a successful header
    pub fn ok(cluster_id: u64) -> Self {
        Self {
            cluster_id,
            error: None,
        }
    }

    /// Generate a header carrying a protocol level error
    pub fn error(
        cluster_id: u64,
        error_type: ErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id,
            error: Some(Error {
                r#type: error_type.into(),
                message: message.into(),
            }),
        }
    }

    /// Embedded error kind; a missing error means OK.
    /// Kinds this build does not know decode as `Unknown`, never as `Ok`.
    pub fn error_type(&self) -> ErrorType {
        match self.error.as_ref() {
            Some(e) => ErrorType::try_from(e.r#type).unwrap_or(ErrorType::Unknown),
            None => ErrorType::Ok,
        }
    }

    /// Raw wire value of the error kind
    pub fn error_code(&self) -> i32 {
        self.error.as_ref().map_or(ErrorType::Ok as i32, |e| e.r#type)
    }

    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default()
    }

    pub fn is_ok(&self) -> bool {
        self.error_code() == ErrorType::Ok as i32
    }
}
