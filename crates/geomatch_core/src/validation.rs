//! Input validation for conversation answers
//!
//! Every validator here runs before the conversation tracker advances, so a
//! rejected answer leaves the user on the same step.

use crate::geo::Coordinate;
use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 50;
pub const MAX_BIO_LEN: usize = 1000;
pub const MIN_AGE: u8 = 14;
pub const MAX_AGE: u8 = 80;

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    #[diagnostic(code(geomatch_core::validation::empty_name))]
    EmptyName,

    #[error("Name is {len} characters long, the limit is {max}")]
    #[diagnostic(code(geomatch_core::validation::name_too_long))]
    NameTooLong { len: usize, max: usize },

    #[error("'{input}' is not a recognised gender")]
    #[diagnostic(
        code(geomatch_core::validation::invalid_gender),
        help("Reply with m or f")
    )]
    InvalidGender { input: String },

    #[error("'{input}' is not a number")]
    #[diagnostic(code(geomatch_core::validation::invalid_age))]
    InvalidAge { input: String },

    #[error("Age {age} is outside {min}..={max}")]
    #[diagnostic(code(geomatch_core::validation::age_out_of_range))]
    AgeOutOfRange { age: i64, min: u8, max: u8 },

    #[error("'{input}' is not an age range")]
    #[diagnostic(
        code(geomatch_core::validation::invalid_age_range),
        help("Use the form 20-30")
    )]
    InvalidAgeRange { input: String },

    #[error("Bio cannot be empty")]
    #[diagnostic(code(geomatch_core::validation::empty_bio))]
    EmptyBio,

    #[error("Bio is {len} characters long, the limit is {max}")]
    #[diagnostic(code(geomatch_core::validation::bio_too_long))]
    BioTooLong { len: usize, max: usize },

    #[error("Location ({latitude}, {longitude}) is not a usable fix")]
    #[diagnostic(
        code(geomatch_core::validation::invalid_location),
        help("Share your current location from the device")
    )]
    InvalidLocation { latitude: f64, longitude: f64 },
}

pub fn validate_title_name(input: &str) -> Result<String, ValidationError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }
    Ok(name.to_string())
}

pub fn parse_age(input: &str) -> Result<u8, ValidationError> {
    let age: i64 = input
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidAge {
            input: input.trim().to_string(),
        })?;
    check_age(age)
}

fn check_age(age: i64) -> Result<u8, ValidationError> {
    if age < i64::from(MIN_AGE) || age > i64::from(MAX_AGE) {
        return Err(ValidationError::AgeOutOfRange {
            age,
            min: MIN_AGE,
            max: MAX_AGE,
        });
    }
    // range checked above
    Ok(age as u8)
}

/// Inclusive age filter collected by the search flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

pub fn parse_age_range(input: &str) -> Result<AgeRange, ValidationError> {
    let invalid = || ValidationError::InvalidAgeRange {
        input: input.trim().to_string(),
    };

    let (low, high) = input.trim().split_once('-').ok_or_else(invalid)?;
    let low: i64 = low.trim().parse().map_err(|_| invalid())?;
    let high: i64 = high.trim().parse().map_err(|_| invalid())?;
    let min = check_age(low)?;
    let max = check_age(high)?;
    if min > max {
        return Err(invalid());
    }
    Ok(AgeRange { min, max })
}

pub fn validate_bio(input: &str) -> Result<String, ValidationError> {
    let bio = input.trim();
    if bio.is_empty() {
        return Err(ValidationError::EmptyBio);
    }
    let len = bio.chars().count();
    if len > MAX_BIO_LEN {
        return Err(ValidationError::BioTooLong {
            len,
            max: MAX_BIO_LEN,
        });
    }
    Ok(bio.to_string())
}

pub fn validate_location(coordinate: Coordinate) -> Result<Coordinate, ValidationError> {
    if coordinate.is_valid() {
        Ok(coordinate)
    } else {
        Err(ValidationError::InvalidLocation {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        })
    }
}
