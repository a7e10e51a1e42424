//! Account identity and the pre-flight confirmation gate
//!
//! Destructive commands confirm which account they are pointed at before
//! touching anything. The gate resolves the caller identity via STS, shows
//! account id and aliases, and asks for an explicit yes unless skipped.

use crate::aws::AwsContext;
use crate::confirm;
use crate::context::ExecutionContext;
use anyhow::{bail, Context, Result};
use tracing::info;

/// Resolve the account id of the current credentials.
pub async fn get_account_id(aws: &AwsContext) -> Result<String> {
    let identity = aws
        .sts_client()
        .get_caller_identity()
        .send()
        .await
        .context("Failed to resolve caller identity")?;
    identity
        .account()
        .map(String::from)
        .context("Caller identity carries no account id")
}

/// List the account's IAM aliases. Most accounts have zero or one.
pub async fn get_account_aliases(aws: &AwsContext) -> Result<Vec<String>> {
    let aliases = aws
        .iam_client()
        .list_account_aliases()
        .send()
        .await
        .context("Failed to list account aliases")?;
    Ok(aliases.account_aliases().to_vec())
}

/// Confirm the target account with the operator.
///
/// Identity resolution failures abort: running a deletion tool against an
/// unknown account is never acceptable. A declined prompt also aborts.
pub async fn confirm_account(
    aws: &AwsContext,
    ctx: &ExecutionContext,
    skip_check: bool,
) -> Result<String> {
    let account_id = get_account_id(aws).await?;
    let aliases = get_account_aliases(aws).await.unwrap_or_default();

    let label = if aliases.is_empty() {
        account_id.clone()
    } else {
        format!("{account_id} ({})", aliases.join(", "))
    };
    info!(
        account = %label,
        region = %aws.region(),
        "{}operating on account",
        ctx.log_prefix()
    );

    if skip_check || ctx.dry_run || ctx.auto_approve {
        return Ok(account_id);
    }

    let proceed = confirm::confirm(&format!("Proceed against account {label}?"))?;
    if !proceed {
        bail!("Aborted: account {account_id} not confirmed");
    }
    Ok(account_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn resolves_account_id() {
        let aws = AwsContext::new("eu-west-1", None).await;
        let account = get_account_id(&aws).await.unwrap();
        assert_eq!(account.len(), 12);
        assert!(account.chars().all(|c| c.is_ascii_digit()));
    }
}
