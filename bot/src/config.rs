use std::net::SocketAddr;
use std::path::PathBuf;

use duty_core::error::AppError;
use duty_net::vcloud::PolicyRef;

/// Runtime configuration, read from the environment (`.env` is loaded by
/// `main` before this runs). Integrations are optional blocks: each is either
/// fully configured or absent, and the matching commands answer
/// "not configured" when absent.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub group_id: i64,
    pub topic_id: Option<i32>,
    pub admin_ids: Vec<u64>,

    pub db_path: PathBuf,
    pub webhook_addr: SocketAddr,
    pub log_dir: PathBuf,

    pub zabbix: Option<ZabbixSettings>,
    pub wg: Option<WgSettings>,
    pub vcloud: Option<VcloudSettings>,
}

#[derive(Debug, Clone)]
pub struct ZabbixSettings {
    pub api_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct WgSettings {
    pub api_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct VcloudSettings {
    pub base_url: String,
    pub tenant: String,
    pub refresh_token: String,
    pub vdc_urn: String,
    pub storage_policies: Vec<PolicyRef>,
}

fn required(name: &str) -> Result<String, AppError> {
    std::env::var(name).map_err(|_| {
        AppError::new("CONFIG_MISSING", format!("{name} is not set"))
            .with_details("set it in the environment or .env")
    })
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        AppError::new("CONFIG_INVALID", format!("{name} is not valid"))
            .with_details(format!("value={value}; err={e}"))
    })
}

/// Parse `name=urn,name=urn` into policy references.
fn parse_storage_policies(raw: &str) -> Result<Vec<PolicyRef>, AppError> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, urn) = part.split_once('=').ok_or_else(|| {
            AppError::new("CONFIG_INVALID", "VCD_STORAGE_POLICIES is not valid")
                .with_details(format!("expected name=urn, got {part}"))
        })?;
        out.push(PolicyRef {
            name: name.trim().to_string(),
            urn: urn.trim().to_string(),
        });
    }
    Ok(out)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let bot_token = required("BOT_TOKEN")?;
        let group_id = parse("GROUP_ID", &required("GROUP_ID")?)?;
        let topic_id = match optional("TOPIC_ID") {
            Some(raw) => Some(parse("TOPIC_ID", &raw)?),
            None => None,
        };

        let admin_ids = match optional("ADMIN_IDS") {
            Some(raw) => raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse::<u64>("ADMIN_IDS", s))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let db_path =
            PathBuf::from(optional("DB_PATH").unwrap_or_else(|| "dutybot.sqlite".to_string()));
        let webhook_addr = parse(
            "WEBHOOK_ADDR",
            &optional("WEBHOOK_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        )?;
        let log_dir = PathBuf::from(optional("LOG_DIR").unwrap_or_else(|| "logs".to_string()));

        let zabbix = match optional("ZABBIX_URL") {
            Some(api_url) => Some(ZabbixSettings {
                api_url,
                username: required("ZABBIX_USER")?,
                password: required("ZABBIX_PASSWORD")?,
            }),
            None => None,
        };

        let wg = match optional("WG_API_URL") {
            Some(api_url) => Some(WgSettings {
                api_url,
                api_key: required("WG_API_KEY")?,
            }),
            None => None,
        };

        let vcloud = match optional("VCD_BASE_URL") {
            Some(base_url) => Some(VcloudSettings {
                base_url,
                tenant: required("VCD_TENANT")?,
                refresh_token: required("VCD_REFRESH_TOKEN")?,
                vdc_urn: required("VCD_VDC_URN")?,
                storage_policies: parse_storage_policies(
                    &optional("VCD_STORAGE_POLICIES").unwrap_or_default(),
                )?,
            }),
            None => None,
        };

        Ok(Self {
            bot_token,
            group_id,
            topic_id,
            admin_ids,
            db_path,
            webhook_addr,
            log_dir,
            zabbix,
            wg,
            vcloud,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_policies_parse_name_urn_pairs() {
        let policies =
            parse_storage_policies("Gold=urn:vcloud:policy:1, Bronze=urn:vcloud:policy:2")
                .expect("parse");
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].name, "Gold");
        assert_eq!(policies[1].urn, "urn:vcloud:policy:2");

        assert!(parse_storage_policies("no-equals-sign").is_err());
        assert!(parse_storage_policies("").unwrap().is_empty());
    }
}
