// **************************************************************************
// Copyright (c) 2018 Pietro Saccardi All Rights Reserved.
//
// This file is part of hidled
// **************************************************************************

use crate::io_return::IoReturn;
use thiserror::Error;

pub type HidResult<T> = Result<T, HidError>;

#[derive(Debug, Error)]
pub enum HidError {
    /// The device could not be opened on behalf of a value access.
    ///
    /// Recoverable: callers walking many elements can skip the element and
    /// carry on with the next one.
    #[error("cannot open device: {code}")]
    CannotOpen { code: IoReturn },

    /// The platform rejected a value access on a device that is open.
    #[error("{operation} failed: {code}")]
    UnexpectedStatus {
        operation: &'static str,
        code: IoReturn,
    },

    #[error("cannot open HID manager: {code}")]
    ManagerOpen { code: IoReturn },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HidError {
    /// Platform status carried by this error, if any.
    pub fn code(&self) -> Option<IoReturn> {
        match self {
            HidError::CannotOpen { code }
            | HidError::UnexpectedStatus { code, .. }
            | HidError::ManagerOpen { code } => Some(*code),
            HidError::Io(_) => None,
        }
    }
}
