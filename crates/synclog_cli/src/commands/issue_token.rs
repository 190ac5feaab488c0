//! Issue-token command implementation.

use synclog_core::AccountId;
use synclog_server::{AuthConfig, TokenValidator};

/// Prints a bearer token for `account`, or for a fresh account id.
pub fn run(secret: &[u8], account: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let (account, token) = issue(secret, account)?;
    println!("account: {account}");
    println!("token:   {token}");
    Ok(())
}

fn issue(
    secret: &[u8],
    account: Option<&str>,
) -> Result<(AccountId, String), Box<dyn std::error::Error>> {
    if secret.is_empty() {
        return Err("Token secret must not be empty".into());
    }
    let account = match account {
        Some(id) => id.parse::<AccountId>()?,
        None => AccountId::new_v4(),
    };
    let token = TokenValidator::new(AuthConfig::new(secret.to_vec())).create_token(account)?;
    Ok((account, token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_validates() {
        let account = AccountId::new_v4().to_string();
        let (parsed, token) = issue(b"secret", Some(&account)).unwrap();
        assert_eq!(parsed.to_string(), account);

        let validator = TokenValidator::new(AuthConfig::new(b"secret".to_vec()));
        assert_eq!(validator.validate_token(&token).unwrap(), parsed);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(issue(b"", None).is_err());
        assert!(issue(b"secret", Some("not-a-uuid")).is_err());
    }
}
