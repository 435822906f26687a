//! Runtime configuration for Stockor.
//!
//! Changing an option can have consequences that surface much later (new
//! customers on the wrong terms, GL postings to the wrong branch), so every
//! change to a string option is logged.

use std::sync::{OnceLock, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

/// GL account numbers used as defaults for freshly created records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultGlAccounts {
    /// Accounts receivable, for new customers.
    pub ar: String,
    /// Accounts payable, for new vendors.
    pub ap: String,
    /// Freight, for new vendors.
    pub freight: String,
    /// Inventory asset, for new skus.
    pub asset: String,
    pub inventory_receipts_clearing: String,
    /// Funds awaiting deposit.
    pub deposit_holding: String,
}

impl Default for DefaultGlAccounts {
    fn default() -> Self {
        Self {
            ar: "1200".to_string(),
            ap: "2200".to_string(),
            freight: "6420".to_string(),
            asset: "1100".to_string(),
            inventory_receipts_clearing: "2600".to_string(),
            deposit_holding: "1010".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    table_prefix: String,
    default_branch_code: String,
    user_model: String,
    default_location_code: String,
    skus_backorder_default: bool,
    tax_sku_code: String,
    ship_sku_code: String,
    customer_terms_code: String,
    vendor_terms_code: String,
    default_gl_accounts: DefaultGlAccounts,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            table_prefix: "skr_".to_string(),
            default_branch_code: "01".to_string(),
            user_model: "UserProxy".to_string(),
            default_location_code: "DEFAULT".to_string(),
            skus_backorder_default: true,
            tax_sku_code: "TAX".to_string(),
            ship_sku_code: "SHIP".to_string(),
            customer_terms_code: "CASH".to_string(),
            vendor_terms_code: "CASH".to_string(),
            default_gl_accounts: DefaultGlAccounts::default(),
        }
    }
}

macro_rules! string_options {
    ($($(#[$doc:meta])* $name:ident / $setter:ident / $env:literal;)*) => {
        impl Configuration {
            $(
                $(#[$doc])*
                pub fn $name(&self) -> &str {
                    &self.$name
                }

                pub fn $setter(&mut self, value: impl Into<String>) {
                    let value = value.into();
                    tracing::info!(
                        option = stringify!($name),
                        "config option {} changed from {} to {}",
                        stringify!($name),
                        self.$name,
                        value
                    );
                    self.$name = value;
                }
            )*

            fn overlay_strings(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
                $(
                    if let Some(v) = lookup($env) {
                        self.$setter(v);
                    }
                )*
            }
        }
    };
}

string_options! {
    /// Prefix applied to every database table.
    table_prefix / set_table_prefix / "STOCKOR_TABLE_PREFIX";
    /// GL branch code for newly created locations.
    default_branch_code / set_default_branch_code / "STOCKOR_DEFAULT_BRANCH_CODE";
    /// Name of the user model stamped on created_by / updated_by.
    user_model / set_user_model / "STOCKOR_USER_MODEL";
    /// Location used by transactions that don't name one.
    default_location_code / set_default_location_code / "STOCKOR_DEFAULT_LOCATION_CODE";
    /// Sku representing tax.
    tax_sku_code / set_tax_sku_code / "STOCKOR_TAX_SKU_CODE";
    /// Sku representing shipping charges.
    ship_sku_code / set_ship_sku_code / "STOCKOR_SHIP_SKU_CODE";
    /// Payment term given to new customers.
    customer_terms_code / set_customer_terms_code / "STOCKOR_CUSTOMER_TERMS_CODE";
    /// Payment term given to new vendors.
    vendor_terms_code / set_vendor_terms_code / "STOCKOR_VENDOR_TERMS_CODE";
}

impl Configuration {
    /// Do freshly created skus default to being backorderable?
    pub fn skus_backorder_default(&self) -> bool {
        self.skus_backorder_default
    }

    pub fn set_skus_backorder_default(&mut self, value: bool) {
        self.skus_backorder_default = value;
    }

    pub fn default_gl_accounts(&self) -> &DefaultGlAccounts {
        &self.default_gl_accounts
    }

    pub fn set_default_gl_accounts(&mut self, value: DefaultGlAccounts) {
        tracing::info!(option = "default_gl_accounts", "config option default_gl_accounts changed");
        self.default_gl_accounts = value;
    }

    /// Defaults overlaid with `STOCKOR_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from an arbitrary source (env, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.overlay_strings(&lookup);

        if let Some(v) = lookup("STOCKOR_SKUS_BACKORDER_DEFAULT") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.set_skus_backorder_default(true),
                "0" | "false" | "no" => config.set_skus_backorder_default(false),
                other => tracing::warn!(value = other, "ignoring invalid STOCKOR_SKUS_BACKORDER_DEFAULT"),
            }
        }

        let gl = &mut config.default_gl_accounts;
        for (key, slot) in [
            ("STOCKOR_GL_AR", &mut gl.ar),
            ("STOCKOR_GL_AP", &mut gl.ap),
            ("STOCKOR_GL_FREIGHT", &mut gl.freight),
            ("STOCKOR_GL_ASSET", &mut gl.asset),
            ("STOCKOR_GL_INVENTORY_RECEIPTS_CLEARING", &mut gl.inventory_receipts_clearing),
            ("STOCKOR_GL_DEPOSIT_HOLDING", &mut gl.deposit_holding),
        ] {
            if let Some(v) = lookup(key) {
                *slot = v;
            }
        }

        config
    }

    /// Process-wide configuration, initialized with defaults on first use.
    pub fn global() -> RwLockReadGuard<'static, Configuration> {
        let lock = global_lock();
        match lock.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mutate the process-wide configuration.
    pub fn configure(f: impl FnOnce(&mut Configuration)) {
        let lock = global_lock();
        let mut guard = match lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }

    /// Replace the process-wide configuration wholesale (startup).
    pub fn install(config: Configuration) {
        Self::configure(|c| *c = config);
    }
}

fn global_lock() -> &'static RwLock<Configuration> {
    static GLOBAL: OnceLock<RwLock<Configuration>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Configuration::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_stockor_conventions() {
        let c = Configuration::default();
        assert_eq!(c.table_prefix(), "skr_");
        assert_eq!(c.default_branch_code(), "01");
        assert_eq!(c.default_location_code(), "DEFAULT");
        assert!(c.skus_backorder_default());
        assert_eq!(c.customer_terms_code(), "CASH");
        assert_eq!(c.default_gl_accounts().ar, "1200");
        assert_eq!(c.default_gl_accounts().deposit_holding, "1010");
    }

    #[test]
    fn lookup_overlays_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STOCKOR_TABLE_PREFIX", "erp_"),
            ("STOCKOR_SKUS_BACKORDER_DEFAULT", "false"),
            ("STOCKOR_GL_AR", "1300"),
        ]);
        let c = Configuration::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(c.table_prefix(), "erp_");
        assert!(!c.skus_backorder_default());
        assert_eq!(c.default_gl_accounts().ar, "1300");
        assert_eq!(c.default_gl_accounts().ap, "2200");
        assert_eq!(c.vendor_terms_code(), "CASH");
    }

    #[test]
    fn invalid_boolean_is_ignored() {
        let c = Configuration::from_lookup(|k| {
            (k == "STOCKOR_SKUS_BACKORDER_DEFAULT").then(|| "maybe".to_string())
        });
        assert!(c.skus_backorder_default());
    }

    #[test]
    fn setters_replace_values() {
        let mut c = Configuration::default();
        c.set_tax_sku_code("SALESTAX");
        assert_eq!(c.tax_sku_code(), "SALESTAX");
    }
}
