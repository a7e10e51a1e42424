//! Typed classification of AWS service errors
//!
//! Deletion flows care about a handful of error classes: the resource is
//! already gone, something still references it, the API is throttling us, or
//! anything else. Classification is keyed on the AWS error code; when the
//! typed metadata is unavailable the code is extracted from the SDK's debug
//! representation.

use aws_sdk_ec2::error::ProvideErrorMetadata;
use thiserror::Error;

/// Error codes that mean the resource no longer exists.
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidSubnetID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidGroupId.NotFound",
    "InvalidNetworkInterfaceID.NotFound",
    "NatGatewayNotFound",
    "InvalidNatGatewayID.NotFound",
    "InvalidVpcEndpointId.NotFound",
    "InvalidVpcID.NotFound",
    "InvalidInstanceID.NotFound",
    "InvalidAllocationID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidRoute.NotFound",
    "InvalidAssociationID.NotFound",
    "InvalidAttachmentID.NotFound",
    "InvalidPermission.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "NoSuchBucket",
    "NoSuchEntity",
    "NoSuchDistribution",
    "PipelineNotFoundException",
    "RepositoryNotFoundException",
    "ResourceNotFoundException",
    "ClusterNotFoundException",
    "ServiceNotFoundException",
];

/// Error codes that mean something still holds the resource.
const IN_USE_CODES: &[&str] = &[
    "InvalidGroup.InUse",
    "InvalidNetworkInterface.InUse",
    "InvalidSubnet.InUse",
];

/// Error codes for API rate limiting.
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// A classified AWS service error.
#[derive(Debug, Error)]
pub enum AwsError {
    #[error("{resource_type} {resource_id} not found")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("dependency violation deleting {resource_id}: {message}")]
    DependencyViolation {
        resource_id: String,
        message: String,
    },

    #[error("{resource_id} is in use: {message}")]
    InUse {
        resource_id: String,
        message: String,
    },

    #[error("throttled by AWS: {message}")]
    Throttled { message: String },

    #[error("AWS error {code}: {message}")]
    Sdk { code: String, message: String },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Only throttling is worth retrying automatically; dependency violations
    /// mean the caller has ordering work to do first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled { .. })
    }
}

/// Classify a bare error code and message against the known code lists.
pub fn classify_error_code(
    code: &str,
    message: &str,
    resource_type: &str,
    resource_id: &str,
) -> AwsError {
    if NOT_FOUND_CODES.contains(&code) {
        AwsError::NotFound {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
        }
    } else if code == "DependencyViolation" {
        AwsError::DependencyViolation {
            resource_id: resource_id.to_string(),
            message: message.to_string(),
        }
    } else if IN_USE_CODES.contains(&code) {
        AwsError::InUse {
            resource_id: resource_id.to_string(),
            message: message.to_string(),
        }
    } else if THROTTLING_CODES.contains(&code) {
        AwsError::Throttled {
            message: message.to_string(),
        }
    } else {
        AwsError::Sdk {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Classify an SDK error that carries typed metadata.
pub fn classify_sdk_error<E>(err: &E, resource_type: &str, resource_id: &str) -> AwsError
where
    E: ProvideErrorMetadata,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err.message().unwrap_or("no message").to_string();
    classify_error_code(&code, &message, resource_type, resource_id)
}

/// Classify an anyhow-wrapped SDK error by scraping the error code out of the
/// debug representation. Used where the typed error has already been erased.
pub fn classify_anyhow_error(
    err: &anyhow::Error,
    resource_type: &str,
    resource_id: &str,
) -> AwsError {
    let debug = format!("{err:?}");
    let code = extract_code(&debug).unwrap_or_else(|| "Unknown".to_string());
    classify_error_code(&code, &debug, resource_type, resource_id)
}

/// Pull an error code out of an SDK debug string, e.g.
/// `code: Some("DependencyViolation")`.
fn extract_code(debug: &str) -> Option<String> {
    let start = debug.find("code: Some(\"")? + "code: Some(\"".len();
    let rest = &debug[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes_classify_as_not_found() {
        let err = classify_error_code(
            "InvalidSubnetID.NotFound",
            "gone",
            "subnet",
            "subnet-0abc",
        );
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn dependency_violation_is_not_retryable() {
        let err = classify_error_code(
            "DependencyViolation",
            "has dependencies",
            "security-group",
            "sg-0abc",
        );
        assert!(matches!(err, AwsError::DependencyViolation { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn in_use_classifies_separately_from_dependency() {
        let err = classify_error_code("InvalidNetworkInterface.InUse", "attached", "eni", "eni-0abc");
        assert!(matches!(err, AwsError::InUse { .. }));
    }

    #[test]
    fn throttling_is_retryable() {
        for code in ["Throttling", "ThrottlingException", "RequestLimitExceeded"] {
            let err = classify_error_code(code, "slow down", "bucket", "my-bucket");
            assert!(err.is_retryable(), "{code} should be retryable");
        }
    }

    #[test]
    fn unknown_codes_fall_through_to_sdk() {
        let err = classify_error_code("AccessDenied", "nope", "bucket", "my-bucket");
        match err {
            AwsError::Sdk { code, .. } => assert_eq!(code, "AccessDenied"),
            other => panic!("expected Sdk, got {other:?}"),
        }
    }

    #[test]
    fn extracts_code_from_debug_string() {
        let err = anyhow::anyhow!(
            "ServiceError {{ source: Unhandled {{ meta: ErrorMetadata {{ code: Some(\"DependencyViolation\"), message: Some(\"x\") }} }} }}"
        );
        let classified = classify_anyhow_error(&err, "subnet", "subnet-0abc");
        assert!(matches!(classified, AwsError::DependencyViolation { .. }));
    }

    #[test]
    fn missing_code_classifies_as_sdk_unknown() {
        let err = anyhow::anyhow!("connection reset");
        let classified = classify_anyhow_error(&err, "subnet", "subnet-0abc");
        assert!(matches!(classified, AwsError::Sdk { .. }));
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = AwsError::NotFound {
            resource_type: "subnet".into(),
            resource_id: "subnet-0abc".into(),
        };
        assert_eq!(err.to_string(), "subnet subnet-0abc not found");
    }
}
