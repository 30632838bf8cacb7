//! Region detection and deterministic fallback URLs.
//!
//! When neither the cache nor the remote router can answer, a server URL is
//! derived from the application identifier alone:
//!
//! ```text
//! app id suffix ──▶ Region ──▶ domain
//!                                 │
//! https://{app id lowercased}.{module}.{domain}
//! ```
//!
//! Nothing here touches the network or any shared state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app_id::AppId;
use crate::module::Module;

/// Deployment region of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Domestic (mainland) deployment. The default when no suffix matches.
    Cn,
    /// Limited-international deployment.
    Ce,
    /// International deployment.
    Us,
}

impl Region {
    /// Suffix matching order.
    ///
    /// Matching walks this list front to back and stops at the first hit, so
    /// an identifier carrying more than one marker still resolves to exactly
    /// one region. `Cn` is last because it is also the default.
    pub const MATCH_ORDER: [Region; 3] = [Region::Us, Region::Ce, Region::Cn];

    /// Identifier suffix marking an application of this region.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Region::Cn => "-gzGzoHsz",
            Region::Ce => "-9Nh9j0Va",
            Region::Us => "-MdYXbMMI",
        }
    }

    /// Base domain hosting this region's services.
    #[must_use]
    pub const fn domain(self) -> &'static str {
        match self {
            Region::Cn => "lncld.net",
            Region::Ce => "lncldapi.com",
            Region::Us => "lncldglobal.com",
        }
    }

    /// Detects the region of an application from its identifier suffix.
    ///
    /// Comparison is case-sensitive; an identifier with no known suffix is
    /// domestic.
    #[must_use]
    pub fn detect(app_id: &AppId) -> Region {
        Region::MATCH_ORDER
            .into_iter()
            .find(|region| app_id.as_str().ends_with(region.suffix()))
            .unwrap_or(Region::Cn)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::Cn => "cn",
            Region::Ce => "ce",
            Region::Us => "us",
        };
        f.write_str(name)
    }
}

/// Derives default server URLs without network access.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResolver;

impl FallbackResolver {
    /// Returns the domain-derived URL of `module` for `app_id`.
    #[must_use]
    pub fn resolve(app_id: &AppId, module: Module) -> String {
        let domain = Region::detect(app_id).domain();
        format!(
            "https://{}.{}.{}",
            app_id.host_label(),
            module.path_name(),
            domain
        )
    }
}
