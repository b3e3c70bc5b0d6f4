use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use duty_core::db;
use duty_core::domain::IncidentAction;
use duty_core::error::AppError;
use duty_net::vcloud::{CloudReporter, VcloudClient};
use duty_net::wgdashboard::WgDashboardClient;
use duty_net::zabbix::ZabbixClient;

use crate::config::Config;

/// What the bot is waiting for from a specific operator in a specific chat.
///
/// The original alert keyboard sets one of these; the operator's next text
/// message in that chat completes the flow.
#[derive(Debug, Clone)]
pub enum Pending {
    /// Mandatory comment for a lifecycle transition.
    Comment {
        action: IncidentAction,
        incident_id: i64,
    },
    /// `@username` for manual reassignment.
    Reassign { incident_id: i64 },
    /// Name for a WireGuard peer to create.
    WgPeerName { interface: String },
    /// Raw JSON for a new WireGuard configuration.
    WgConfigJson,
}

pub type PendingKey = (i64, u64); // (chat id, user id)

/// Shared handler state, cheap to clone into every dispatch branch.
#[derive(Clone)]
pub struct BotState {
    pub config: Arc<Config>,
    pub zabbix: Option<Arc<ZabbixClient>>,
    pub wg: Option<Arc<WgDashboardClient>>,
    pub cloud: Option<Arc<CloudReporter>>,
    pending: Arc<Mutex<HashMap<PendingKey, Pending>>>,
    wg_selected: Arc<Mutex<HashMap<i64, String>>>,
}

impl BotState {
    pub fn new(config: Config) -> Self {
        let zabbix = config
            .zabbix
            .as_ref()
            .map(|z| Arc::new(ZabbixClient::new(&z.api_url, &z.username, &z.password)));

        let wg = config
            .wg
            .as_ref()
            .map(|w| Arc::new(WgDashboardClient::new(&w.api_url, &w.api_key)));

        let cloud = config.vcloud.as_ref().map(|v| {
            Arc::new(CloudReporter::new(
                VcloudClient::new(&v.base_url, &v.tenant, &v.refresh_token),
                &v.vdc_urn,
                v.storage_policies.clone(),
            ))
        });

        Self {
            config: Arc::new(config),
            zabbix,
            wg,
            cloud,
            pending: Arc::new(Mutex::new(HashMap::new())),
            wg_selected: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open a fresh connection; migrations ran once at startup.
    pub fn open_db(&self) -> Result<rusqlite::Connection, AppError> {
        db::open(&self.config.db_path)
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.config.admin_ids.contains(&user_id)
    }

    pub fn set_pending(&self, key: PendingKey, pending: Pending) {
        self.pending.lock().unwrap().insert(key, pending);
    }

    pub fn peek_pending(&self, key: PendingKey) -> Option<Pending> {
        self.pending.lock().unwrap().get(&key).cloned()
    }

    pub fn clear_pending(&self, key: PendingKey) -> bool {
        self.pending.lock().unwrap().remove(&key).is_some()
    }

    /// Remember which WireGuard interface the chat is browsing.
    pub fn select_interface(&self, chat_id: i64, interface: impl Into<String>) {
        self.wg_selected
            .lock()
            .unwrap()
            .insert(chat_id, interface.into());
    }

    pub fn selected_interface(&self, chat_id: i64) -> Option<String> {
        self.wg_selected.lock().unwrap().get(&chat_id).cloned()
    }
}

/// Run a blocking closure (rusqlite, ureq) off the async executor.
pub async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::wrap("TASK_JOIN_FAILED", "Background task failed", e))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> BotState {
        BotState::new(Config {
            bot_token: "token".into(),
            group_id: -100,
            topic_id: None,
            admin_ids: vec![42],
            db_path: ":memory:".into(),
            webhook_addr: "127.0.0.1:0".parse().unwrap(),
            log_dir: "logs".into(),
            zabbix: None,
            wg: None,
            vcloud: None,
        })
    }

    #[test]
    fn pending_actions_are_keyed_per_chat_and_user() {
        let state = test_state();
        let key = (-100, 42);

        assert!(state.peek_pending(key).is_none());
        state.set_pending(
            key,
            Pending::Comment {
                action: IncidentAction::Close,
                incident_id: 7,
            },
        );

        assert!(state.peek_pending((-100, 43)).is_none());
        assert!(matches!(
            state.peek_pending(key),
            Some(Pending::Comment { incident_id: 7, .. })
        ));

        assert!(state.clear_pending(key));
        assert!(!state.clear_pending(key));
    }

    #[test]
    fn admin_gate_checks_the_configured_ids() {
        let state = test_state();
        assert!(state.is_admin(42));
        assert!(!state.is_admin(7));
    }
}
