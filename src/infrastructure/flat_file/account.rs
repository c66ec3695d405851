use crate::domain::core::Account;
use crate::domain::Entity;

use super::{field, fields, Record, RecordError};

/// `username password roleName`
impl Record for Account {
    const TABLE: &'static str = Account::ENTITY_NAME;

    fn parse(line: &str) -> Result<Self, RecordError> {
        let [username, password, role] = fields(line)?;
        let role = field("role", role)?;
        Ok(Account::create(username.into(), password.to_owned(), role)?)
    }

    fn to_line(&self) -> String {
        format!("{} {} {}", self.username(), self.password(), self.role())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::core::Role;

    #[test]
    fn test_parse_account() {
        let account = Account::parse("  alice   s3cret NonResident ").unwrap();
        assert_eq!(account.username().as_str(), "alice");
        assert!(account.verify_password("s3cret"));
        assert_eq!(account.role(), Role::NonResident);
        assert_eq!(account.weekly_hours(), 0);
    }

    #[test]
    fn test_parse_account_errors() {
        assert_eq!(
            Account::parse("alice s3cret").err(),
            Some(RecordError::FieldCount {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(
            Account::parse("alice s3cret Mayor").err(),
            Some(RecordError::InvalidField {
                field: "role",
                value: "Mayor".to_owned()
            })
        );
    }
}
