use std::fmt;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::credentials::Credentials;
use crate::error::RyebotError;
use crate::wiki::{
    EditReceipt, MediaWikiClient, MediaWikiClientConfig, PageContent, SiteIdentity, WikiApi,
};

/// One authenticated connection to one wiki, validated post-login. Reads
/// are open to scripts; the mutating call is crate-internal so the only
/// write path is the dry-run guard in `edit`.
pub struct Session {
    api: Box<dyn WikiApi>,
    identity: SiteIdentity,
}

// The boxed client has no Debug of its own; the identity is the useful part.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn identity(&self) -> &SiteIdentity {
        &self.identity
    }

    pub fn read(&mut self, title: &str) -> Result<PageContent> {
        debug!("reading page \"{title}\"");
        self.api.read_page(title)
    }

    pub(crate) fn write(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
    ) -> Result<EditReceipt> {
        self.api.edit_page(title, content, summary)
    }

    pub fn request_count(&self) -> usize {
        self.api.request_count()
    }
}

type Connector = Box<dyn FnMut() -> Result<Box<dyn WikiApi>>>;

/// Owns the process's single wiki session. Lazily authenticates on first
/// use and hands out the cached session afterwards.
pub struct SessionManager {
    target_wiki: String,
    connect: Connector,
    session: Option<Session>,
    login_count: usize,
}

impl SessionManager {
    pub fn new(config: &BotConfig) -> Self {
        let client_config = MediaWikiClientConfig::from_config(config);
        Self::with_connector(
            config.wiki_id(),
            Box::new(move || {
                let client = MediaWikiClient::new(client_config.clone())?;
                Ok(Box::new(client) as Box<dyn WikiApi>)
            }),
        )
    }

    pub fn with_connector(target_wiki: String, connect: Connector) -> Self {
        Self {
            target_wiki,
            connect,
            session: None,
            login_count: 0,
        }
    }

    /// Get the live session, authenticating on the first call. Repeated
    /// calls within one run return the same handle without a second login.
    pub fn session(&mut self, credentials: &Credentials) -> Result<&mut Session> {
        let session = match self.session.take() {
            Some(session) => session,
            None => self.establish(credentials)?,
        };
        Ok(self.session.insert(session))
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn login_count(&self) -> usize {
        self.login_count
    }

    fn establish(&mut self, credentials: &Credentials) -> Result<Session> {
        info!("logging in to wiki...");
        let mut api = (self.connect)()?;
        api.login(credentials.username(), credentials.password())?;
        self.login_count += 1;

        let identity = api.site_identity()?;
        if identity.wiki_id != self.target_wiki {
            return Err(RyebotError::Authentication {
                wiki: self.target_wiki.clone(),
                reason: format!(
                    "landed on wiki \"{}\" ({}) instead",
                    identity.wiki_id, identity.host
                ),
            }
            .into());
        }

        let expected_user = credentials.account_name();
        let wiki_user = identity.username.replace(' ', "_");
        if wiki_user != expected_user {
            return Err(RyebotError::Authentication {
                wiki: self.target_wiki.clone(),
                reason: format!("logged in as \"{wiki_user}\" but expected \"{expected_user}\""),
            }
            .into());
        }

        info!(
            "logged in to wiki \"{}\" ({}) with user \"{}\"",
            identity.wiki_id, identity.host, wiki_user
        );
        Ok(Session { api, identity })
    }
}

#[cfg(test)]
mod tests {
    use crate::credentials::Credentials;
    use crate::error::RyebotError;
    use crate::testutil::{ApiState, manager_with_state, shared_state};

    fn credentials() -> Credentials {
        Credentials::for_tests("Ryebot@ryebot_flask", "hunter2")
    }

    #[test]
    fn second_session_call_reuses_the_cached_handle() {
        let state = shared_state(ApiState::default());
        let mut manager = manager_with_state("terraria", &state);
        let credentials = credentials();

        manager.session(&credentials).expect("first session");
        manager.session(&credentials).expect("second session");

        assert_eq!(manager.login_count(), 1);
        assert_eq!(state.borrow().login_calls, 1);
        assert!(manager.is_connected());
    }

    #[test]
    fn session_debug_shows_the_identity_not_the_client() {
        let state = shared_state(ApiState::default());
        let mut manager = manager_with_state("terraria", &state);

        let session = manager.session(&credentials()).expect("session");
        let rendered = format!("{session:?}");
        assert!(rendered.contains("terraria"));
        assert!(rendered.contains("Ryebot"));
    }

    #[test]
    fn session_rejects_the_wrong_wiki() {
        let state = shared_state(ApiState {
            wiki_id: "minecraft".to_string(),
            host: "minecraft.wiki.gg".to_string(),
            ..ApiState::default()
        });
        let mut manager = manager_with_state("terraria", &state);

        let error = manager.session(&credentials()).expect_err("must fail");
        let authentication = error
            .downcast_ref::<RyebotError>()
            .expect("typed error");
        assert!(matches!(
            authentication,
            RyebotError::Authentication { .. }
        ));
        assert!(error.to_string().contains("minecraft"));
        assert!(!manager.is_connected());
    }

    #[test]
    fn session_rejects_an_unexpected_username() {
        let state = shared_state(ApiState {
            wiki_username: "Somebody Else".to_string(),
            ..ApiState::default()
        });
        let mut manager = manager_with_state("terraria", &state);

        let error = manager.session(&credentials()).expect_err("must fail");
        assert!(error.to_string().contains("Somebody_Else"));
        assert!(error.to_string().contains("Ryebot"));
    }

    #[test]
    fn login_failure_surfaces_as_authentication_error() {
        let state = shared_state(ApiState {
            fail_login: Some("Incorrect username or password entered.".to_string()),
            ..ApiState::default()
        });
        let mut manager = manager_with_state("terraria", &state);

        let error = manager.session(&credentials()).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<RyebotError>(),
            Some(RyebotError::Authentication { .. })
        ));
        assert_eq!(manager.login_count(), 0);
        assert!(!manager.is_connected());
    }
}
