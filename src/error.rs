//! A custom BugHunter error.
use std::fmt;
use std::io;
use std::result;

use thiserror::Error;

#[derive(Error, Debug)]
/// A custom BugHunter error
pub enum Error {
    /// An IO based error
    IO(io::Error),
    /// Invalid regular expression in a rule set
    Regex(regex::Error),
    /// Rules file error
    Rules(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IO(ref err) => write!(f, "{err}"),
            Error::Regex(ref err) => write!(f, "Regex: {err}"),
            Error::Rules(ref msg) => write!(f, "Rules: {msg}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IO(err)
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Error {
        Error::Regex(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
