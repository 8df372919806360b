//! Error types and error groups used as rule keys.
//!
//! Rust has no subclassing, so an [`ErrorType`] is an explicit matcher: a
//! name plus a test against the raised error. [`ErrorType::of`] accepts any
//! value of a concrete type; [`ErrorType::variant`] narrows that to values
//! satisfying a predicate, which is how a family of errors (one enum) and its
//! members (variants) form a two-level hierarchy.

use crate::error::{RescueError, RescueResult};
use std::any::TypeId;
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

type Matcher = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// A matchable error type.
#[derive(Clone)]
pub struct ErrorType {
    name: Cow<'static, str>,
    type_id: TypeId,
    matcher: Matcher,
}

impl ErrorType {
    /// Match any error whose concrete type is `E`.
    ///
    /// Named after the last path segment of the type, e.g. `NetworkError`.
    /// Two types with the same short name get the same name; use
    /// [`ErrorType::named`] to tell them apart.
    pub fn of<E: Error + 'static>() -> Self {
        Self::named::<E>(short_type_name(std::any::type_name::<E>()))
    }

    /// Like [`ErrorType::of`], with an explicit name.
    ///
    /// The name becomes part of the persisted counter key, so it must stay
    /// stable across deployments.
    pub fn named<E: Error + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<E>(),
            matcher: Arc::new(|err: &(dyn Error + 'static)| err.is::<E>()),
        }
    }

    /// Match errors of type `E` for which `predicate` holds.
    ///
    /// ```
    /// use rescue_core::ErrorType;
    ///
    /// #[derive(Debug, thiserror::Error)]
    /// enum ApiError {
    ///     #[error("rate limited")]
    ///     RateLimited,
    ///     #[error("bad request")]
    ///     BadRequest,
    /// }
    ///
    /// let limited = ErrorType::variant::<ApiError, _>("ApiError::RateLimited", |e| {
    ///     matches!(e, ApiError::RateLimited)
    /// });
    ///
    /// assert!(limited.matches(&ApiError::RateLimited));
    /// assert!(!limited.matches(&ApiError::BadRequest));
    /// ```
    pub fn variant<E, F>(name: impl Into<Cow<'static, str>>, predicate: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            type_id: TypeId::of::<E>(),
            matcher: Arc::new(move |err: &(dyn Error + 'static)| {
                err.downcast_ref::<E>().is_some_and(&predicate)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `err` is of this type.
    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        (self.matcher)(err)
    }

    /// Same name over the same concrete type.
    pub fn same_as(&self, other: &ErrorType) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorType").field(&self.name).finish()
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Strip module paths from every path inside a type name.
///
/// `app::net::Wrapped<app::net::Inner>` becomes `Wrapped<Inner>`.
fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut path = String::new();
    for c in full.chars() {
        if c.is_alphanumeric() || c == '_' || c == ':' {
            path.push(c);
        } else {
            out.push_str(last_segment(&path));
            path.clear();
            out.push(c);
        }
    }
    out.push_str(last_segment(&path));
    out
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Ordered, non-empty list of error types treated as one unit.
///
/// Its [`Display`](fmt::Display) form, e.g. `[NetworkError, TimeoutError]`,
/// keys the attempt counter stored in the job.
#[derive(Clone, Debug)]
pub struct ErrorGroup {
    types: Vec<ErrorType>,
}

impl ErrorGroup {
    /// Build a group, flattening nested lists.
    ///
    /// Fails with [`RescueError::InvalidErrorGroup`] when the result is empty
    /// or contains an unnamed type.
    pub fn new(errors: impl IntoErrorGroup) -> RescueResult<Self> {
        let types = errors.into_error_types();

        if types.is_empty() {
            return Err(RescueError::InvalidErrorGroup(
                "at least one error type is required".to_string(),
            ));
        }
        if let Some(position) = types.iter().position(|t| t.name().trim().is_empty()) {
            return Err(RescueError::InvalidErrorGroup(format!(
                "error type at position {} has an empty name",
                position
            )));
        }

        Ok(Self { types })
    }

    pub fn types(&self) -> &[ErrorType] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Whether any type in the group matches `err`.
    pub fn matches(&self, err: &(dyn Error + 'static)) -> bool {
        self.types.iter().any(|t| t.matches(err))
    }

    /// Counter key for this group.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Same types in the same order.
    pub fn same_as(&self, other: &ErrorGroup) -> bool {
        self.types.len() == other.types.len()
            && self.types.iter().zip(&other.types).all(|(a, b)| a.same_as(b))
    }
}

impl fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, t) in self.types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(t.name())?;
        }
        f.write_str("]")
    }
}

/// Anything that flattens into a list of error types.
pub trait IntoErrorGroup {
    fn into_error_types(self) -> Vec<ErrorType>;
}

impl IntoErrorGroup for ErrorType {
    fn into_error_types(self) -> Vec<ErrorType> {
        vec![self]
    }
}

impl IntoErrorGroup for ErrorGroup {
    fn into_error_types(self) -> Vec<ErrorType> {
        self.types
    }
}

impl<T: IntoErrorGroup> IntoErrorGroup for Vec<T> {
    fn into_error_types(self) -> Vec<ErrorType> {
        self.into_iter().flat_map(IntoErrorGroup::into_error_types).collect()
    }
}

impl<T: IntoErrorGroup, const N: usize> IntoErrorGroup for [T; N] {
    fn into_error_types(self) -> Vec<ErrorType> {
        self.into_iter().flat_map(IntoErrorGroup::into_error_types).collect()
    }
}

/// List of [`ErrorType::of`] for each listed type.
///
/// ```
/// use rescue_core::{ErrorGroup, errors};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("network down")]
/// struct NetworkError;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("timed out")]
/// struct TimeoutError;
///
/// let group = ErrorGroup::new(errors![NetworkError, TimeoutError]).unwrap();
/// assert_eq!(group.key(), "[NetworkError, TimeoutError]");
/// ```
#[macro_export]
macro_rules! errors {
    ($($error:ty),+ $(,)?) => {
        vec![$($crate::ErrorType::of::<$error>()),+]
    };
}
