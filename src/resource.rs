//! The capability contract every pooled resource type implements

use std::error::Error as StdError;

/// How a borrow scope ended, handed to [`Resource::before_return`]
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The scope finished normally
    Completed,

    /// The scope ended with an error
    Failed {
        error: &'a (dyn StdError + 'static),
        /// Result of [`Resource::is_invalidating_error`] for `error`
        invalidating: bool,
    },

    /// The scope is unwinding from a panic
    Panicked,
}

impl Outcome<'_> {
    /// Whether the instance must be destroyed rather than recycled
    pub fn is_invalidating(&self) -> bool {
        matches!(self, Outcome::Failed { invalidating: true, .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// A type of expensive, non-thread-safe object that can be pooled.
///
/// The pool calls these methods synchronously. `construct` and `destroy`
/// are required; the hooks default to no-ops.
///
/// # Examples
///
/// ```
/// use borrowpool::{Outcome, Resource};
/// use std::io;
///
/// struct Session { open: bool, statements: Vec<String> }
///
/// struct SessionFactory;
///
/// impl Resource for SessionFactory {
///     type Config = String;
///     type Instance = Session;
///     type Error = io::Error;
///
///     fn construct(&self, _host: &String) -> io::Result<Session> {
///         Ok(Session { open: true, statements: Vec::new() })
///     }
///
///     fn destroy(&self, mut session: Session) -> io::Result<()> {
///         session.open = false;
///         Ok(())
///     }
///
///     fn before_return(&self, session: &mut Session, outcome: Outcome<'_>) {
///         if !outcome.is_success() {
///             session.statements.clear();
///         }
///     }
///
///     fn is_invalidating_error(&self, error: &(dyn std::error::Error + 'static)) -> bool {
///         error
///             .downcast_ref::<io::Error>()
///             .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
///     }
/// }
/// ```
pub trait Resource: Send + Sync + 'static {
    /// Opaque value passed to `construct`
    type Config: Send + Sync + 'static;

    /// The pooled object
    type Instance: Send + 'static;

    /// Failure raised by `construct` or `destroy`
    type Error: StdError + Send + Sync + 'static;

    /// Build a new instance
    fn construct(&self, config: &Self::Config) -> Result<Self::Instance, Self::Error>;

    /// Release any underlying handle. Errors are logged, never propagated.
    fn destroy(&self, instance: Self::Instance) -> Result<(), Self::Error>;

    /// Called every time an instance is handed to a caller
    fn before_use(&self, _instance: &mut Self::Instance) {}

    /// Called before an instance goes back to the store or is discarded
    fn before_return(&self, _instance: &mut Self::Instance, _outcome: Outcome<'_>) {}

    /// Whether an error that escaped a borrow scope leaves the instance unusable
    fn is_invalidating_error(&self, _error: &(dyn StdError + 'static)) -> bool {
        false
    }
}
