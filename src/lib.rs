//! Lists, filters and dispatches GitHub Actions workflows.
//!
//! The crate covers the logic behind a workflow dashboard: paging through a repository's workflows,
//! probing which of them accept a `workflow_dispatch` event, deriving the filtered and sorted view,
//! dispatching runs, and completing the GitHub OAuth code exchange through a secret-holding relay.

pub mod env;
pub mod error;
pub mod framework;
pub mod oauth;
pub mod session;
pub mod storage;
pub mod workflow;

/// A shorthand to define a statically allocated variable using a [`std::sync::LazyLock`].
///
/// # Examples
///
/// ```rust
/// # use actions_viewer::static_lazy_lock;
/// # use std::sync::LazyLock;
/// static_lazy_lock!{
///     pub VAR_1: String = String::from("a static variable");
/// }
/// // ...equals to...
/// pub static VAR_2: LazyLock<String> = LazyLock::new(|| String::from("a static variable"));
/// ```
#[macro_export]
macro_rules! static_lazy_lock {
    ($(#[$meta:meta])* $vis:vis $name:ident: $type:ty = $expr:expr $(;)?) => {
        $(#[$meta])*
        $vis static $name: $crate::__priv_macro_use::LazyLock<$type> =
            $crate::__priv_macro_use::LazyLock::new(|| $expr);
    };
}

#[doc(hidden)]
pub mod __priv_macro_use {
    pub use std::sync::LazyLock;
}
