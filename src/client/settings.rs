//! Canonical session settings
//!
//! Every accepted descriptor form (string or structured map) normalizes into
//! [`SessionSettings`]. The value is constructed once, validated centrally,
//! and never mutated by the connector.

use crate::{Error, Result, ERR_MIXED_PRIORITIES, ERR_PRIORITY_OUT_OF_RANGE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Default X protocol port, used wherever a descriptor omits the port.
pub const DEFAULT_PORT: u16 = 33060;

/// Upper bound of the router priority range.
pub const PRIORITY_MAX: u16 = 100;

/// One endpoint the connector can dial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectTarget {
    /// TCP endpoint. IPv6 hosts are stored without brackets.
    Tcp {
        /// Hostname or IP literal
        host: String,
        /// TCP port
        port: u16,
    },
    /// Unix domain socket. The path may be relative (`./` or `../`).
    Socket {
        /// Filesystem path of the socket
        path: PathBuf,
    },
}

impl std::fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectTarget::Tcp { host, port } if host.contains(':') => {
                write!(f, "[{}]:{}", host, port)
            }
            ConnectTarget::Tcp { host, port } => write!(f, "{}:{}", host, port),
            ConnectTarget::Socket { path } => write!(f, "{}", path.display()),
        }
    }
}

/// One candidate endpoint in a router list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterCandidate {
    /// Hostname or IP literal, unbracketed
    pub host: String,
    /// TCP port (defaults to [`DEFAULT_PORT`])
    pub port: u16,
    /// Priority class in `[0, 100]`; higher is tried first. Within one list
    /// either every candidate carries a priority or none does.
    pub priority: Option<u16>,
}

impl RouterCandidate {
    /// Candidate with the default port and no priority
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            priority: None,
        }
    }

    /// The dialable endpoint for this candidate
    pub fn target(&self) -> ConnectTarget {
        ConnectTarget::Tcp {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// How the cluster is reached: one endpoint or an ordered candidate list.
///
/// List syntax in the descriptor always produces `Routers`, even with a
/// single element; the two forms fail differently downstream (direct error
/// vs. failover loop), so they are never collapsed into each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Routing {
    /// Exactly one endpoint
    Single(ConnectTarget),
    /// Ordered candidate list walked by the failover connector
    Routers(Vec<RouterCandidate>),
}

/// TLS material referenced by a descriptor: filesystem paths only.
///
/// Compiling the paths into a client configuration happens in
/// [`crate::connection`]; the parser only records where the files live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    /// CA certificate bundle (PEM). `None` means system roots.
    pub ca: Option<PathBuf>,
    /// Client certificate for mutual TLS (PEM)
    pub cert: Option<PathBuf>,
    /// Client private key for mutual TLS (PEM)
    pub key: Option<PathBuf>,
}

impl TlsMaterial {
    /// Whether no path was supplied at all
    pub fn is_empty(&self) -> bool {
        self.ca.is_none() && self.cert.is_none() && self.key.is_none()
    }
}

/// Validated representation of "how to reach the cluster"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Username, percent-decoded. Empty when the descriptor had no userinfo.
    pub user: String,
    /// Password, percent-decoded. May be empty.
    pub password: String,
    /// Default schema; empty string means "no default schema"
    pub schema: String,
    /// Endpoint or router list
    pub routing: Routing,
    /// TLS material, when the descriptor supplied any
    pub tls: Option<TlsMaterial>,
}

impl SessionSettings {
    /// Settings for a single TCP endpoint with empty credentials
    pub fn single(host: impl Into<String>, port: u16) -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            schema: String::new(),
            routing: Routing::Single(ConnectTarget::Tcp {
                host: host.into(),
                port,
            }),
            tls: None,
        }
    }

    /// Build settings from an already-structured map (the non-string
    /// descriptor form).
    ///
    /// Recognized keys: `user`, `password`, `schema`, `host`, `port`,
    /// `socket`, `routers` (array of `{host, port, priority}` objects),
    /// `ssl-ca`, `ssl-cert`, `ssl-key`. Exactly one of `host`, `socket`,
    /// `routers` must be present. The same validation as the string parser
    /// applies (priority invariants, port defaults).
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self> {
        let text = |key: &str| -> Result<Option<String>> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(Error::malformed(format!(
                    "'{}' must be a string, got {}",
                    key, other
                ))),
            }
        };

        let user = text("user")?.unwrap_or_default();
        let password = text("password")?.unwrap_or_default();
        let schema = text("schema")?.unwrap_or_default();

        let port = match map.get("port") {
            None | Some(Value::Null) => None,
            Some(value) => Some(map_port(value)?),
        };

        let routing = match (map.get("host"), map.get("socket"), map.get("routers")) {
            (Some(Value::String(host)), None, None) => Routing::Single(ConnectTarget::Tcp {
                host: host.clone(),
                port: port.unwrap_or(DEFAULT_PORT),
            }),
            (None, Some(Value::String(path)), None) => Routing::Single(ConnectTarget::Socket {
                path: PathBuf::from(path),
            }),
            (None, None, Some(Value::Array(entries))) => {
                let mut routers = Vec::with_capacity(entries.len());
                for entry in entries {
                    routers.push(map_router(entry)?);
                }
                Routing::Routers(routers)
            }
            (None, None, None) => {
                return Err(Error::malformed(
                    "one of 'host', 'socket' or 'routers' is required",
                ))
            }
            _ => {
                return Err(Error::malformed(
                    "'host', 'socket' and 'routers' are mutually exclusive",
                ))
            }
        };

        let tls = {
            let material = TlsMaterial {
                ca: text("ssl-ca")?.map(PathBuf::from),
                cert: text("ssl-cert")?.map(PathBuf::from),
                key: text("ssl-key")?.map(PathBuf::from),
            };
            (!material.is_empty()).then_some(material)
        };

        let settings = Self {
            user,
            password,
            schema,
            routing,
            tls,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Central validation pass: priority invariants over the full candidate
    /// set. Runs before any network activity; violations carry stable codes.
    pub fn validate(&self) -> Result<()> {
        let Routing::Routers(routers) = &self.routing else {
            return Ok(());
        };

        let with_priority = routers.iter().filter(|r| r.priority.is_some()).count();
        if with_priority != 0 && with_priority != routers.len() {
            return Err(Error::configuration(
                ERR_MIXED_PRIORITIES,
                "either all routers must carry a priority or none of them",
            ));
        }

        for router in routers {
            if let Some(priority) = router.priority {
                if priority > PRIORITY_MAX {
                    return Err(Error::configuration(
                        ERR_PRIORITY_OUT_OF_RANGE,
                        format!(
                            "priority {} for router '{}' is outside [0, {}]",
                            priority, router.host, PRIORITY_MAX
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn map_port(value: &Value) -> Result<u16> {
    let number = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    number
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| Error::malformed(format!("invalid port: {}", value)))
}

fn map_router(entry: &Value) -> Result<RouterCandidate> {
    let Value::Object(fields) = entry else {
        return Err(Error::malformed(format!(
            "router entry must be an object, got {}",
            entry
        )));
    };

    let host = match fields.get("host") {
        Some(Value::String(host)) => host.clone(),
        _ => return Err(Error::malformed("router entry is missing 'host'")),
    };
    let port = match fields.get("port") {
        None | Some(Value::Null) => DEFAULT_PORT,
        Some(value) => map_port(value)?,
    };
    // Range checking happens in validate(), not here: an out-of-range value
    // must surface as code 4007, not as a malformed descriptor.
    let priority = match fields.get("priority") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(
            n.as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| Error::malformed(format!("invalid priority: {}", n)))?,
        ),
        Some(other) => return Err(Error::malformed(format!("invalid priority: {}", other))),
    };

    Ok(RouterCandidate {
        host,
        port,
        priority,
    })
}
