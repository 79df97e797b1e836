//! Recording fakes shared by the unit tests: an in-memory `WikiApi` whose
//! state stays observable after the session takes ownership of the client.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Result;

use crate::context::RunContext;
use crate::credentials::Credentials;
use crate::error::RyebotError;
use crate::session::SessionManager;
use crate::wiki::{EditReceipt, PageContent, SiteIdentity, WikiApi};

#[derive(Debug, Clone)]
pub(crate) struct EditCall {
    pub title: String,
    pub content: String,
    pub summary: String,
}

pub(crate) struct ApiState {
    pub wiki_id: String,
    pub host: String,
    pub wiki_username: String,
    pub pages: BTreeMap<String, String>,
    pub edits: Vec<EditCall>,
    pub login_calls: usize,
    pub read_calls: usize,
    pub fail_login: Option<String>,
    pub reject_edits: Option<String>,
}

impl Default for ApiState {
    fn default() -> Self {
        Self {
            wiki_id: "terraria".to_string(),
            host: "terraria.wiki.gg".to_string(),
            wiki_username: "Ryebot".to_string(),
            pages: BTreeMap::new(),
            edits: Vec::new(),
            login_calls: 0,
            read_calls: 0,
            fail_login: None,
            reject_edits: None,
        }
    }
}

pub(crate) fn shared_state(state: ApiState) -> Rc<RefCell<ApiState>> {
    Rc::new(RefCell::new(state))
}

pub(crate) struct RecordingApi {
    state: Rc<RefCell<ApiState>>,
    request_count: usize,
}

impl WikiApi for RecordingApi {
    fn login(&mut self, _username: &str, _password: &str) -> Result<()> {
        self.request_count += 1;
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.fail_login {
            return Err(RyebotError::Authentication {
                wiki: state.wiki_id.clone(),
                reason: reason.clone(),
            }
            .into());
        }
        state.login_calls += 1;
        Ok(())
    }

    fn site_identity(&mut self) -> Result<SiteIdentity> {
        self.request_count += 1;
        let state = self.state.borrow();
        Ok(SiteIdentity {
            wiki_id: state.wiki_id.clone(),
            host: state.host.clone(),
            username: state.wiki_username.clone(),
        })
    }

    fn read_page(&mut self, title: &str) -> Result<PageContent> {
        self.request_count += 1;
        let mut state = self.state.borrow_mut();
        state.read_calls += 1;
        match state.pages.get(title) {
            Some(content) => Ok(PageContent {
                title: title.to_string(),
                exists: true,
                content: content.clone(),
                revision_id: Some(100),
                timestamp: Some("2026-08-01T00:00:00Z".to_string()),
            }),
            None => Ok(PageContent {
                title: title.to_string(),
                exists: false,
                content: String::new(),
                revision_id: None,
                timestamp: None,
            }),
        }
    }

    fn edit_page(&mut self, title: &str, content: &str, summary: &str) -> Result<EditReceipt> {
        self.request_count += 1;
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.reject_edits {
            return Err(RyebotError::WriteFailed {
                page: title.to_string(),
                reason: reason.clone(),
            }
            .into());
        }
        state.edits.push(EditCall {
            title: title.to_string(),
            content: content.to_string(),
            summary: summary.to_string(),
        });
        state.pages.insert(title.to_string(), content.to_string());
        Ok(EditReceipt {
            title: title.to_string(),
            revision_id: Some(9001),
            no_change: false,
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub(crate) fn manager_with_state(
    target_wiki: &str,
    state: &Rc<RefCell<ApiState>>,
) -> SessionManager {
    let state = Rc::clone(state);
    SessionManager::with_connector(
        target_wiki.to_string(),
        Box::new(move || {
            Ok(Box::new(RecordingApi {
                state: Rc::clone(&state),
                request_count: 0,
            }) as Box<dyn WikiApi>)
        }),
    )
}

pub(crate) fn test_context(
    state: &Rc<RefCell<ApiState>>,
    dry_run: bool,
    ci_mode: bool,
    run_id: Option<&str>,
) -> RunContext {
    RunContext::new(
        "testscript",
        Credentials::for_tests("Ryebot@ryebot_flask", "hunter2"),
        manager_with_state("terraria", state),
        dry_run,
        ci_mode,
        run_id.map(ToString::to_string),
    )
}
