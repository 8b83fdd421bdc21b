//! Response validation.
//!
//! A validator rejection is a fatal failure: the same request would produce
//! the same unusable answer, so it is neither retried nor cached.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::ModelError;

pub trait ResponseValidator: Send + Sync {
  fn validate(&self, text: &str) -> Result<(), ModelError>;
}

/// Accepts any response text.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ResponseValidator for AcceptAll {
  fn validate(&self, _text: &str) -> Result<(), ModelError> {
    Ok(())
  }
}

/// Requires a JSON object containing every listed field.
#[derive(Debug, Clone)]
pub struct JsonFieldsValidator {
  fields: Vec<String>,
}

impl JsonFieldsValidator {
  pub fn new<I, S>(fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      fields: fields.into_iter().map(Into::into).collect(),
    }
  }
}

impl ResponseValidator for JsonFieldsValidator {
  fn validate(&self, text: &str) -> Result<(), ModelError> {
    let value: serde_json::Value =
      serde_json::from_str(text.trim()).map_err(|e| ModelError::InvalidResponse(format!("not JSON: {e}")))?;
    let Some(object) = value.as_object() else {
      return Err(ModelError::InvalidResponse("expected a JSON object".into()));
    };
    if let Some(missing) = self.fields.iter().find(|field| !object.contains_key(field.as_str())) {
      return Err(ModelError::InvalidResponse(format!("missing field `{missing}`")));
    }
    Ok(())
  }
}

/// Requires the response to deserialize as `T`.
///
/// Use this when the caller parses the response into a type, so that every
/// response it would reject is rejected here too and never reaches the cache.
pub struct TypedJsonValidator<T> {
  _target: PhantomData<fn() -> T>,
}

impl<T> TypedJsonValidator<T> {
  pub fn new() -> Self {
    Self { _target: PhantomData }
  }
}

impl<T> Default for TypedJsonValidator<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> fmt::Debug for TypedJsonValidator<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TypedJsonValidator")
      .field("target", &std::any::type_name::<T>())
      .finish()
  }
}

impl<T: DeserializeOwned> ResponseValidator for TypedJsonValidator<T> {
  fn validate(&self, text: &str) -> Result<(), ModelError> {
    serde_json::from_str::<T>(text.trim())
      .map(|_| ())
      .map_err(|e| ModelError::InvalidResponse(format!("unexpected response shape: {e}")))
  }
}
