use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created {
        username: String,
        full_name: String,
        department: String,
        logged_password: Option<String>,
    },
    Skipped {
        username: String,
    },
    Error {
        username: String,
        message: String,
    },
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionOutcome::Created {
                username,
                full_name,
                department,
                logged_password,
            } => {
                write!(f, "CREATED: {username} ({full_name}) Dept={department}")?;
                if let Some(password) = logged_password {
                    write!(f, " (password: {password})")?;
                }
                Ok(())
            }
            ProvisionOutcome::Skipped { username } => {
                write!(f, "SKIPPED: {username} already exists")
            }
            ProvisionOutcome::Error { username, message } => {
                write!(f, "ERROR: {username} -> {message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Skip { username: String },
    ProfileRemoved { username: String },
    ProfileInUse { username: String },
    AccountDeleted { username: String },
    Error { username: String, message: String },
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Skip { username } => write!(f, "SKIP: {username} not found"),
            CleanupOutcome::ProfileRemoved { username } => {
                write!(f, "PROFILE REMOVED: {username}")
            }
            CleanupOutcome::ProfileInUse { username } => {
                write!(
                    f,
                    "WARNING: profile for {username} is in use; leaving it in place"
                )
            }
            CleanupOutcome::AccountDeleted { username } => {
                write!(f, "ACCOUNT DELETED: {username}")
            }
            CleanupOutcome::Error { username, message } => {
                write!(f, "ERROR: {username} -> {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_line_without_password() {
        let o = ProvisionOutcome::Created {
            username: "jdoe".to_string(),
            full_name: "Jane ".to_string(),
            department: "Eng".to_string(),
            logged_password: None,
        };
        assert_eq!(o.to_string(), "CREATED: jdoe (Jane ) Dept=Eng");
    }

    #[test]
    fn created_line_with_logged_password() {
        let o = ProvisionOutcome::Created {
            username: "jdoe".to_string(),
            full_name: "Jane Doe".to_string(),
            department: "Eng".to_string(),
            logged_password: Some("Temp123!".to_string()),
        };
        assert_eq!(
            o.to_string(),
            "CREATED: jdoe (Jane Doe) Dept=Eng (password: Temp123!)"
        );
    }

    #[test]
    fn skipped_and_error_lines() {
        let s = ProvisionOutcome::Skipped {
            username: "jdoe".to_string(),
        };
        assert_eq!(s.to_string(), "SKIPPED: jdoe already exists");

        let e = ProvisionOutcome::Error {
            username: "bad/name".to_string(),
            message: "invalid account name".to_string(),
        };
        assert_eq!(e.to_string(), "ERROR: bad/name -> invalid account name");
    }

    #[test]
    fn cleanup_lines() {
        assert_eq!(
            CleanupOutcome::Skip {
                username: "ghost".to_string()
            }
            .to_string(),
            "SKIP: ghost not found"
        );
        assert_eq!(
            CleanupOutcome::ProfileRemoved {
                username: "jdoe".to_string()
            }
            .to_string(),
            "PROFILE REMOVED: jdoe"
        );
        assert_eq!(
            CleanupOutcome::ProfileInUse {
                username: "jdoe".to_string()
            }
            .to_string(),
            "WARNING: profile for jdoe is in use; leaving it in place"
        );
        assert_eq!(
            CleanupOutcome::AccountDeleted {
                username: "jdoe".to_string()
            }
            .to_string(),
            "ACCOUNT DELETED: jdoe"
        );
    }
}
