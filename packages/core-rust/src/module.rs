//! Backend service modules an application can be routed to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named backend service.
///
/// Each module has a short path name (used in fallback host names and on the
/// command line) and a router key (the field name in app-router documents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    /// REST API server.
    Api,
    /// Cloud engine (hosted functions).
    Engine,
    /// Push notification server.
    Push,
    /// Entry point of realtime-messaging server discovery.
    RtmRouter,
    /// Statistics collection server.
    Stats,
}

impl Module {
    /// Every module, in declaration order.
    pub const ALL: [Module; 5] = [
        Module::Api,
        Module::Engine,
        Module::Push,
        Module::RtmRouter,
        Module::Stats,
    ];

    /// Host label used when deriving fallback URLs.
    #[must_use]
    pub const fn path_name(self) -> &'static str {
        match self {
            Module::Api => "api",
            Module::Engine => "engine",
            Module::Push => "push",
            Module::RtmRouter => "rtm",
            Module::Stats => "stats",
        }
    }

    /// Field name of this module in an app-router document.
    #[must_use]
    pub const fn router_key(self) -> &'static str {
        match self {
            Module::Api => "api_server",
            Module::Engine => "engine_server",
            Module::Push => "push_server",
            Module::RtmRouter => "rtm_router_server",
            Module::Stats => "stats_server",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_name())
    }
}

/// Error returned when a string names no known module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for Module {
    type Err = UnknownModule;

    /// Accepts either the path name (`"api"`) or the router key (`"api_server"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::ALL
            .into_iter()
            .find(|m| m.path_name() == s || m.router_key() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}
