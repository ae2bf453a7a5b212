//! Request validation.
//!
//! Every check returns the full list of field violations rather than
//! stopping at the first one. Callers run these before any side effect.

use std::fmt;

use crate::types::UserId;

pub const LOGIN_MIN_CHARS: usize = 3;
pub const LOGIN_MAX_CHARS: usize = 150;
pub const PASSWORD_MIN_CHARS: usize = 5;
pub const RECORD_NAME_MAX_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldViolation>);

impl ValidationErrors {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldViolation {
            field,
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", v.field, v.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

fn check_login(errors: &mut ValidationErrors, login: &str) {
    let len = login.chars().count();
    if len == 0 {
        errors.push("login", "is required");
    } else if len < LOGIN_MIN_CHARS {
        errors.push(
            "login",
            format!("must be at least {LOGIN_MIN_CHARS} characters"),
        );
    } else if len > LOGIN_MAX_CHARS {
        errors.push(
            "login",
            format!("must be at most {LOGIN_MAX_CHARS} characters"),
        );
    }
}

fn check_password(errors: &mut ValidationErrors, field: &'static str, password: &str) {
    let len = password.chars().count();
    if len == 0 {
        errors.push(field, "is required");
    } else if len < PASSWORD_MIN_CHARS {
        errors.push(
            field,
            format!("must be at least {PASSWORD_MIN_CHARS} characters"),
        );
    }
}

pub fn validate_registration(login: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    check_login(&mut errors, login);
    check_password(&mut errors, "password", password);
    errors.into_result()
}

/// Login only requires both fields to be present; length rules are not
/// re-checked so old accounts keep working if the rules tighten.
pub fn validate_login(login: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if login.is_empty() {
        errors.push("login", "is required");
    }
    if password.is_empty() {
        errors.push("password", "is required");
    }
    errors.into_result()
}

pub fn validate_change_password(current: &str, new: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if current.is_empty() {
        errors.push("current_password", "is required");
    }
    check_password(&mut errors, "new_password", new);
    errors.into_result()
}

pub fn validate_new_record(user_id: UserId, name: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if user_id <= 0 {
        errors.push("user_id", "must be a positive id");
    }
    let len = name.trim().chars().count();
    if len == 0 {
        errors.push("name", "is required");
    } else if len > RECORD_NAME_MAX_CHARS {
        errors.push(
            "name",
            format!("must be at most {RECORD_NAME_MAX_CHARS} characters"),
        );
    }
    errors.into_result()
}
