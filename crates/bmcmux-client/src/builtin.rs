//! Registration of the drivers shipped with bmcmux

use bmcmux_bmc::{ipmi, redfish, rpc, wol, BmcTarget, Capabilities, Feature, Features};
use bmcmux_registry::{register_global, Catalog, RegistryError};
use std::sync::Once;
use tracing::{debug, warn};

type InitFn = fn(&BmcTarget) -> bmcmux_bmc::Result<Capabilities>;

/// Built-in drivers in default attempt order
const BUILTINS: [(&str, &str, &[Feature], InitFn); 4] = [
    (rpc::NAME, rpc::PROTOCOL, rpc::FEATURES, rpc::init),
    (redfish::NAME, redfish::PROTOCOL, redfish::FEATURES, redfish::init),
    (ipmi::NAME, ipmi::PROTOCOL, ipmi::FEATURES, ipmi::init),
    (wol::NAME, wol::PROTOCOL, wol::FEATURES, wol::init),
];

static REGISTER: Once = Once::new();

fn features(list: &[Feature]) -> Features {
    list.iter().copied().collect()
}

/// Add the built-in drivers to the process-wide catalog, once
pub fn register_builtin_drivers() {
    REGISTER.call_once(|| {
        for (name, protocol, list, init) in BUILTINS {
            match register_global(name, protocol, features(list), init) {
                Ok(()) => debug!(driver = %name, protocol = %protocol, "Registered built-in driver"),
                Err(RegistryError::Duplicate(_)) => {
                    warn!(driver = %name, "Driver name already taken, built-in not registered")
                }
                Err(e) => warn!(driver = %name, error = %e, "Failed to register built-in driver"),
            }
        }
    });
}

/// A fresh catalog holding only the built-in drivers
pub fn builtin_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    for (name, protocol, list, init) in BUILTINS {
        if let Err(e) = catalog.register(name, protocol, features(list), init) {
            warn!(driver = %name, error = %e, "Failed to register built-in driver");
        }
    }
    catalog
}
