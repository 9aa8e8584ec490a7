//! Application wiring for the dexdesk console.
//!
//! `App` owns the configuration, the credential stores, the API client and
//! the session guard, and implements the account-level flows (login, logout,
//! registration, password recovery). Resource screens live in `commands`.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use dexdesk_core::api::{ApiClient, ApiError, AuthenticatedClient};
use dexdesk_core::auth::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, PublicGuard, RouteDecision,
    SessionGuard, SessionStore, KEY_MY_ACCOUNT,
};
use dexdesk_core::cache::{QueryKey, RequestCache, ResourceQueries};
use dexdesk_core::config::{Config, CredentialBackend};
use dexdesk_core::models::{
    Account, ChangePasswordRequest, RegisterRequest, ResetPasswordRequest, ResourceModel,
    UpdateAccountRequest,
};
use dexdesk_core::routes::{self, Route};

pub struct App {
    pub config: Config,
    api: ApiClient,
    session: SessionStore,
    guard: SessionGuard,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match config.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::open(&config.cache_dir()?)?),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let session = SessionStore::new(store, Arc::new(RequestCache::new()));
        let api = ApiClient::new(config.effective_api_url())?;
        let guard = SessionGuard::new(Arc::new(api.clone()), session.clone());
        info!(api = %api.base_url(), backend = ?config.credential_backend, "App initialized");

        Ok(Self {
            config,
            api,
            session,
            guard,
        })
    }

    pub fn authed(&self) -> AuthenticatedClient {
        AuthenticatedClient::new(self.api.clone(), self.session.clone())
    }

    pub fn queries<M: ResourceModel>(&self) -> ResourceQueries<M> {
        ResourceQueries::new(self.authed())
    }

    // =========================================================================
    // Guards
    // =========================================================================

    /// Run the session guard for a protected route; error if it redirects.
    pub async fn require_session(&mut self, route: Route) -> Result<()> {
        let decision = self.guard.enter().await;
        match routes::resolve(route, decision) {
            Some(target) if target == route => Ok(()),
            Some(Route::Login) => bail!("Not signed in or session expired. Run `dexdesk login`."),
            other => bail!("Cannot open {}: resolved to {:?}", route, other),
        }
    }

    /// Run the public-only guard; error if a session is already present.
    pub fn require_signed_out(&self, route: Route) -> Result<()> {
        let decision = PublicGuard::new(self.session.clone()).enter();
        match routes::resolve(route, decision) {
            Some(target) if target == route => Ok(()),
            Some(Route::Home) => bail!("Already signed in. Run `dexdesk logout` first."),
            other => bail!("Cannot open {}: resolved to {:?}", route, other),
        }
    }

    /// Account confirmed by the last guard run
    pub fn account(&self) -> Option<&Account> {
        self.guard.account()
    }

    // =========================================================================
    // Auth flows
    // =========================================================================

    pub async fn login(&mut self, email: Option<String>) -> Result<()> {
        if PublicGuard::new(self.session.clone()).enter() == RouteDecision::RedirectToHome {
            // A stored token may be dead; let the guard decide
            if self.guard.enter().await == RouteDecision::RenderProtected {
                println!("Already signed in.");
                return Ok(());
            }
        }

        let email = match email {
            Some(email) => email,
            None => Self::prompt_email(self.config.last_email.as_deref())?,
        };
        let password = rpassword::prompt_password("Password: ")?;
        if email.is_empty() || password.is_empty() {
            bail!("Email and password required");
        }

        match self.api.login(&email, &password).await {
            Ok(credentials) => {
                self.session.commit(&credentials);
                self.config.last_email = Some(email.clone());
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }
                info!("Login successful");
                println!("Signed in as {}", email);
                Ok(())
            }
            Err(e) if e.is_email_not_verified() => {
                eprintln!("{}", e.display_message("Email address not verified"));
                if Self::confirm("Resend verification email? [y/N]: ")? {
                    self.api.resend_verification_email(&email).await?;
                    println!("Verification email sent to {}", email);
                }
                bail!("Login failed: email not verified")
            }
            Err(e) => bail!(Self::login_message(&e)),
        }
    }

    fn login_message(e: &ApiError) -> String {
        match e {
            ApiError::Unauthorized => "Invalid email or password".to_string(),
            ApiError::NetworkError(err) if err.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            ApiError::NetworkError(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            other => other.display_message("Login failed"),
        }
    }

    /// Local sign-out: drop both tokens from both stores
    pub fn logout(&self) {
        self.session.clear();
        println!("Signed out");
    }

    pub async fn register(
        &self,
        email: String,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<()> {
        self.require_signed_out(Route::Register)?;
        let password = rpassword::prompt_password("Password: ")?;
        if email.is_empty() || password.is_empty() {
            bail!("Email and password required");
        }
        let body = RegisterRequest {
            first_name,
            last_name,
            email,
            password,
        };
        let message = self
            .api
            .register(&body)
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Registration failed")))?;
        println!("{}", non_empty_or(message, "Registered. Check your inbox to verify your email."));
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        self.require_signed_out(Route::ForgotPassword)?;
        let message = self
            .api
            .forgot_password(email)
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Could not start password reset")))?;
        println!("{}", non_empty_or(message, "Password reset email sent."));
        Ok(())
    }

    pub async fn reset_password(&self, reset_token: &str) -> Result<()> {
        self.require_signed_out(Route::ResetPassword)?;
        let password = rpassword::prompt_password("New password: ")?;
        let confirm_password = rpassword::prompt_password("Confirm password: ")?;
        if password != confirm_password {
            bail!("Passwords do not match");
        }
        let body = ResetPasswordRequest {
            password,
            confirm_password,
        };
        let message = self
            .api
            .reset_password(reset_token, &body)
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Password reset failed")))?;
        println!("{}", non_empty_or(message, "Password updated. You can sign in now."));
        Ok(())
    }

    pub async fn verify_email(&self, verify_token: &str) -> Result<()> {
        self.require_signed_out(Route::VerifyEmail)?;
        let message = self
            .api
            .verify_email(verify_token)
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Email verification failed")))?;
        println!("{}", non_empty_or(message, "Email verified."));
        Ok(())
    }

    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        self.require_signed_out(Route::VerifyEmail)?;
        self.api
            .resend_verification_email(email)
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Could not resend verification email")))?;
        println!("Verification email sent to {}", email);
        Ok(())
    }

    // =========================================================================
    // Account
    // =========================================================================

    pub async fn update_account(&mut self, body: UpdateAccountRequest) -> Result<()> {
        self.require_session(Route::MyAccount).await?;
        self.authed()
            .call(|api, token| async move { api.update_me(&token, &body).await })
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Could not update account")))?;
        self.session.cache().invalidate(&QueryKey::from(KEY_MY_ACCOUNT));
        println!("Account updated");
        Ok(())
    }

    pub async fn change_password(&mut self) -> Result<()> {
        self.require_session(Route::MyAccount).await?;
        let old_password = rpassword::prompt_password("Current password: ")?;
        let new_password = rpassword::prompt_password("New password: ")?;
        let confirm_password = rpassword::prompt_password("Confirm password: ")?;
        if new_password != confirm_password {
            bail!("Passwords do not match");
        }
        let body = ChangePasswordRequest {
            old_password,
            new_password,
            confirm_password,
        };
        self.authed()
            .call(|api, token| async move { api.change_password(&token, &body).await })
            .await
            .map_err(|e| anyhow::anyhow!(e.display_message("Could not change password")))?;
        println!("Password changed");
        Ok(())
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    fn prompt_email(last: Option<&str>) -> Result<String> {
        match last {
            Some(last) => print!("Email [{}]: ", last),
            None => print!("Email: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();
        Ok(match last {
            Some(last) if input.is_empty() => last.to_string(),
            _ => input.to_string(),
        })
    }

    fn confirm(prompt: &str) -> Result<bool> {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim().eq_ignore_ascii_case("y"))
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
