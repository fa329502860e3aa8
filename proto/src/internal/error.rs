use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::result::ResultCode;

/* ===== errors ===== */
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemaError {
    NoClassFound,
    MissingMustAttribute(Vec<String>),
    InvalidAttribute(String),
    InvalidAttributeSyntax(String),
    NoSuchAttribute(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationError {
    // Access control outcomes.
    AccessDenied,
    CriticalEntryProtected,
    NotAuthenticated,

    // Request and data errors.
    EmptyRequest,
    NoMatchingEntries,
    NoMatchingAttributes,
    EntryAlreadyExists,
    NotAllowedOnNonLeaf,
    SchemaViolation(SchemaError),
    InvalidDn(String),
    InvalidAttribute(String),
    AciParseError(String),
    FilterParseError,

    // Internal and collaborator failures.
    Backend(String),
    InvalidCacheState,
    InvalidState,
    InvalidConfig(String),
}

impl Display for OperationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let mut output = format!("{:?}", self)
            .split("::")
            .last()
            .unwrap_or("")
            .to_string();

        if let Some(msg) = self.message() {
            output += &format!(" - {}", msg);
        };
        f.write_str(&output)
    }
}

impl std::error::Error for OperationError {}

impl OperationError {
    /// Return the message associated with the error if there is one.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::AccessDenied => None,
            Self::CriticalEntryProtected => {
                Some("The root entry and the administrator entry may not be altered.".into())
            }
            Self::NotAuthenticated => None,
            Self::EmptyRequest => None,
            Self::NoMatchingEntries => None,
            Self::NoMatchingAttributes => None,
            Self::EntryAlreadyExists => None,
            Self::NotAllowedOnNonLeaf => {
                Some("The entry has subordinates and can not be removed.".into())
            }
            Self::SchemaViolation(_) => None,
            Self::InvalidDn(_) => None,
            Self::InvalidAttribute(_) => None,
            Self::AciParseError(_) => None,
            Self::FilterParseError => None,
            Self::Backend(_) => None,
            Self::InvalidCacheState => {
                Some("An access control cache was asked to track an unknown entry.".into())
            }
            Self::InvalidState => None,
            Self::InvalidConfig(msg) => Some(format!("Invalid configuration: {}", msg)),
        }
    }

    /// True for the errors that a client must see as an access control outcome.
    pub fn is_access_denial(&self) -> bool {
        matches!(self, Self::AccessDenied | Self::CriticalEntryProtected)
    }

    /// The outward result code a protocol responder reports for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::AccessDenied | Self::CriticalEntryProtected => {
                ResultCode::InsufficientAccessRights
            }
            Self::NotAuthenticated => ResultCode::InappropriateAuthentication,
            Self::EmptyRequest => ResultCode::ProtocolError,
            Self::NoMatchingEntries => ResultCode::NoSuchObject,
            Self::NoMatchingAttributes => ResultCode::NoSuchAttribute,
            Self::EntryAlreadyExists => ResultCode::EntryAlreadyExists,
            Self::NotAllowedOnNonLeaf => ResultCode::NotAllowedOnNonLeaf,
            Self::SchemaViolation(SchemaError::NoSuchAttribute(_)) => ResultCode::NoSuchAttribute,
            Self::SchemaViolation(SchemaError::InvalidAttributeSyntax(_)) => {
                ResultCode::InvalidAttributeSyntax
            }
            Self::SchemaViolation(_) => ResultCode::ObjectClassViolation,
            Self::InvalidDn(_) => ResultCode::InvalidDnSyntax,
            Self::InvalidAttribute(_) => ResultCode::UndefinedAttributeType,
            Self::AciParseError(_) => ResultCode::InvalidAttributeSyntax,
            Self::FilterParseError => ResultCode::ProtocolError,
            Self::Backend(_) => ResultCode::Unavailable,
            Self::InvalidCacheState | Self::InvalidState | Self::InvalidConfig(_) => {
                ResultCode::OperationsError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operationerror_as_nice_string() {
        assert_eq!(
            OperationError::AccessDenied.to_string(),
            "AccessDenied".to_string()
        );
        assert_eq!(
            OperationError::NotAllowedOnNonLeaf.to_string(),
            "NotAllowedOnNonLeaf - The entry has subordinates and can not be removed.".to_string()
        );
        assert_eq!(
            OperationError::InvalidDn("cn".to_string()).to_string(),
            "InvalidDn(\"cn\")".to_string()
        );
    }

    #[test]
    fn test_access_outcomes_share_one_result_code() {
        assert!(OperationError::AccessDenied.is_access_denial());
        assert!(OperationError::CriticalEntryProtected.is_access_denial());
        assert_eq!(
            OperationError::AccessDenied.result_code(),
            OperationError::CriticalEntryProtected.result_code()
        );

        // Every other failure must be reported as something other than an access denial.
        let others = [
            OperationError::NoMatchingEntries,
            OperationError::SchemaViolation(SchemaError::MissingMustAttribute(vec![
                "prescriptiveaci".to_string(),
            ])),
            OperationError::Backend("disk".to_string()),
            OperationError::InvalidCacheState,
            OperationError::AciParseError("{".to_string()),
        ];
        for err in others {
            assert!(!err.is_access_denial());
            assert_ne!(err.result_code(), ResultCode::InsufficientAccessRights);
        }
    }

    #[test]
    fn test_operationerror_serde() {
        let err = OperationError::SchemaViolation(SchemaError::NoClassFound);
        let s = serde_json::to_string(&err).expect("failed to serialise");
        let back: OperationError = serde_json::from_str(&s).expect("failed to deserialise");
        assert_eq!(err, back);
    }
}
