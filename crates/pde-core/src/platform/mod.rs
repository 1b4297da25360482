//! Selecting a protection provider.

use std::sync::Arc;
use tracing::{info, warn};

use crate::emulated::EmulatedProtectionService;
use crate::service::SharedService;
use crate::settings::BackendChoice;

#[cfg(windows)]
mod winrt;

/// The provider a session talks to. `service` is `None` when protection is
/// unsupported or disabled. `emulated` is set only for the software
/// stand-in, whose lock state can be driven by hand.
#[derive(Clone, Default)]
pub struct Backend {
    pub service: Option<SharedService>,
    pub emulated: Option<Arc<EmulatedProtectionService>>,
}

impl Backend {
    pub fn open(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Auto | BackendChoice::Platform => {
                let service = try_default();
                if service.is_none() && choice == BackendChoice::Platform {
                    warn!("platform data protection requested but unavailable");
                }
                Self {
                    service,
                    emulated: None,
                }
            }
            BackendChoice::Emulated => Self::emulated(Arc::new(EmulatedProtectionService::new())),
            BackendChoice::Disabled => {
                info!("data protection disabled by configuration");
                Self::default()
            }
        }
    }

    pub fn emulated(service: Arc<EmulatedProtectionService>) -> Self {
        Self {
            service: Some(service.clone()),
            emulated: Some(service),
        }
    }
}

/// The operating system's data protection manager, if this device supports
/// it and it is turned on.
pub fn try_default() -> Option<SharedService> {
    #[cfg(windows)]
    {
        winrt::WindowsProtectionService::try_default().map(|s| Arc::new(s) as SharedService)
    }
    #[cfg(not(windows))]
    {
        info!("no platform data protection on this operating system");
        None
    }
}
