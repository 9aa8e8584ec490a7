//! Console routes and which guard applies to each.

use std::fmt;

use crate::auth::RouteDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    VerifyEmail,
    Home,
    MyAccount,
    Tokens,
    LiquidityPools,
    Trades,
}

/// Which guard a route sits behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Needs a valid session
    Protected,
    /// Only for signed-out users
    PublicOnly,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::ForgotPassword => "/forgot-password",
            Route::ResetPassword => "/reset-password",
            Route::VerifyEmail => "/verify-email",
            Route::Home => "/",
            Route::MyAccount => "/my-account",
            Route::Tokens => "/tokens",
            Route::LiquidityPools => "/liquidityPools",
            Route::Trades => "/trades",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        const ALL: [Route; 10] = [
            Route::Login,
            Route::Register,
            Route::ForgotPassword,
            Route::ResetPassword,
            Route::VerifyEmail,
            Route::Home,
            Route::MyAccount,
            Route::Tokens,
            Route::LiquidityPools,
            Route::Trades,
        ];
        ALL.into_iter().find(|r| r.path() == path)
    }

    pub fn access(&self) -> RouteAccess {
        match self {
            Route::Login
            | Route::Register
            | Route::ForgotPassword
            | Route::ResetPassword
            | Route::VerifyEmail => RouteAccess::PublicOnly,
            Route::Home
            | Route::MyAccount
            | Route::Tokens
            | Route::LiquidityPools
            | Route::Trades => RouteAccess::Protected,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where navigation ends up after the guard decided, `None` while loading.
pub fn resolve(requested: Route, decision: RouteDecision) -> Option<Route> {
    match decision {
        RouteDecision::Loading => None,
        RouteDecision::RenderProtected | RouteDecision::RenderPublic => Some(requested),
        RouteDecision::RedirectToLogin => Some(Route::Login),
        RouteDecision::RedirectToHome => Some(Route::Home),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(Route::from_path("/liquidityPools"), Some(Route::LiquidityPools));
        assert_eq!(Route::from_path("/nope"), None);
    }

    #[test]
    fn test_access() {
        assert_eq!(Route::Trades.access(), RouteAccess::Protected);
        assert_eq!(Route::VerifyEmail.access(), RouteAccess::PublicOnly);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(Route::Tokens, RouteDecision::Loading), None);
        assert_eq!(resolve(Route::Tokens, RouteDecision::RedirectToLogin), Some(Route::Login));
        assert_eq!(resolve(Route::Login, RouteDecision::RedirectToHome), Some(Route::Home));
        assert_eq!(resolve(Route::Tokens, RouteDecision::RenderProtected), Some(Route::Tokens));
    }
}
