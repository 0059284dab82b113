// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{device::RadioStatus, iface::Role, Cookie, IfaceId},
    log::error,
    thiserror::Error,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// No reservation was active when one was expected. Callers treat this as success.
    #[error("no active reservation")]
    InvalidState,
    #[error("resource busy")]
    Busy,
    #[error("out of resources")]
    ResourceExhausted,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("operation not supported for role {0:?}")]
    Unsupported(Role),
    #[error("invalid argument: {0}")]
    InvalidArgs(&'static str),
    #[error("unknown cookie {0:#x}")]
    NotFound(Cookie),
    #[error("unknown interface {0}")]
    UnknownIface(IfaceId),
    #[error("reservation aborted before it became ready")]
    Aborted,
    #[error("radio error: {0}")]
    Radio(#[from] RadioStatus),
}

impl Error {
    /// Soft errors are resolved locally and never require the caller to retry.
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::InvalidState | Error::NotFound(_))
    }
}

impl From<Error> for i32 {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidState => 0,
            Error::Busy => -libc::EBUSY,
            Error::ResourceExhausted => -libc::EAGAIN,
            Error::Timeout(_) => -libc::ETIMEDOUT,
            Error::Unsupported(_) => -libc::EOPNOTSUPP,
            Error::InvalidArgs(_) => -libc::EINVAL,
            Error::NotFound(_) => -libc::ENOENT,
            Error::UnknownIface(_) => -libc::ENODEV,
            Error::Aborted => -libc::ECANCELED,
            Error::Radio(RadioStatus::Busy) => -libc::EBUSY,
            Error::Radio(RadioStatus::NotSupported) => -libc::EOPNOTSUPP,
            Error::Radio(RadioStatus::Failure(code)) if code < 0 => code,
            Error::Radio(RadioStatus::Failure(_)) => -libc::EIO,
        }
    }
}

pub trait ResultExt {
    /// Returns 0 if Self is Ok, otherwise logs the error and turns it into a negative errno.
    fn into_errno(self) -> i32;
}

impl<T> ResultExt for Result<T, Error> {
    fn into_errno(self) -> i32 {
        match self {
            Ok(_) | Err(Error::InvalidState) => 0,
            Err(e) => {
                error!("{}", e);
                e.into()
            }
        }
    }
}
