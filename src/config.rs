use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://www.easydata.co.za/api/v3";
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Everything needed to construct a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, typically `https://www.easydata.co.za/api/v3`.
    pub url: String,
    /// EasyData API key.
    pub key: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    /// Cache directory; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Ask for tidy (long) time-series tables.
    pub tidy: bool,
    pub timeout: Duration,
    /// Show a progress bar while downloading large bodies.
    pub progress: bool,
}

impl ClientConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            key: key.into(),
            verify: true,
            cache_dir: None,
            tidy: true,
            timeout: Duration::from_secs(60),
            progress: false,
        }
    }
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
    cache: Option<bool>,
    cache_dir: Option<String>,
}

/// Resolves configuration from (in order of precedence) explicit arguments,
/// `EASYDATA_*` environment variables and an `.easydatarc` file.
pub(crate) fn load_config(
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| non_empty_env("EASYDATA_API_URL"));
    let mut key = key.or_else(|| non_empty_env("EASYDATA_API_KEY"));
    let mut cache_dir = non_empty_env("EASYDATA_CACHE_DIR").map(PathBuf::from);

    let rc_candidates = rc_candidates();
    let mut file_verify: Option<bool> = None;

    for rc_path in &rc_candidates {
        if rc_path.exists() {
            let cfg = read_rc(rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;

            if url.is_none() {
                url = cfg.url;
            }
            if key.is_none() {
                key = cfg.key;
            }
            if cache_dir.is_none() {
                cache_dir = match (cfg.cache_dir, cfg.cache) {
                    (_, Some(false)) => None,
                    (Some(dir), _) => Some(PathBuf::from(dir)),
                    (None, Some(true)) => Some(PathBuf::from(DEFAULT_CACHE_DIR)),
                    (None, None) => None,
                };
            }
            file_verify = cfg.verify;
            break;
        }
    }

    let key = match key {
        Some(v) => v,
        None => {
            if !rc_candidates.is_empty() {
                bail!(
                    "Missing configuration: key (set EASYDATA_API_KEY or put `key:` in one of: {})",
                    rc_candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            bail!("Missing configuration: key (set EASYDATA_API_KEY or create .easydatarc)");
        }
    };

    let mut cfg = ClientConfig::new(key);
    if let Some(url) = url {
        cfg.url = url.trim_end_matches('/').to_string();
    }
    cfg.verify = verify.or(file_verify).unwrap_or(true);
    cfg.cache_dir = cache_dir;
    Ok(cfg)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // `key:` may be on one line with the value on the next.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') {
                set_value(&mut cfg, pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                if matches!(k, "url" | "key" | "cache_dir") {
                    pending_key = Some(k);
                }
            } else {
                set_value(&mut cfg, k, v);
            }
        }
    }

    cfg
}

fn set_value(cfg: &mut RcConfig, key: &str, value: &str) {
    match key {
        "url" => cfg.url = Some(value.to_string()),
        "key" => cfg.key = Some(value.to_string()),
        "verify" => cfg.verify = Some(value != "0"),
        "cache" => cfg.cache = Some(value != "0"),
        "cache_dir" => cfg.cache_dir = Some(value.to_string()),
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) EASYDATA_RC (explicit)
    // 2) ./.easydatarc
    // 3) ~/.easydatarc
    if let Ok(p) = std::env::var("EASYDATA_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".easydatarc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".easydatarc"));
    }
    v
}
