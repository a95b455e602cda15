//! One-shot producer of external extension preferences for component
//! extensions that are installed from the web store.

use std::collections::BTreeMap;

/// Id of the in-app payments support app, always installed.
pub const IN_APP_PAYMENTS_SUPPORT_APP_ID: &str = "nmmhkkegccagdldgiimedpiccmgmieda";

/// Update URL of the web store.
pub const WEBSTORE_UPDATE_URL: &str = "https://clients2.google.com/service/update2/crx";

/// Preference key suffix naming an extension's update URL.
const EXTERNAL_UPDATE_URL_SUFFIX: &str = ".external_update_url";

/// Switch value that turns the enhanced bookmarks extension off.
const SWITCH_DISABLED: &str = "0";

/// Receives the preference map once loading completes.
pub trait LoadFinished {
    /// Called exactly once per [`ExternalComponentLoader::start_loading`].
    fn load_finished(&mut self, prefs: BTreeMap<String, String>);
}

/// Builds `"<extension id>.external_update_url" -> update URL` entries.
#[derive(Debug, Clone, Default)]
pub struct ExternalComponentLoader {
    enhanced_bookmarks_switch: Option<String>,
    enhanced_bookmarks_extension_id: String,
}

impl ExternalComponentLoader {
    /// Loader with no enhanced bookmarks extension configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the enhanced bookmarks extension. `switch` is the raw
    /// command-line switch value, if the switch was given.
    #[must_use]
    pub fn with_enhanced_bookmarks(
        mut self,
        switch: Option<String>,
        extension_id: impl Into<String>,
    ) -> Self {
        self.enhanced_bookmarks_switch = switch;
        self.enhanced_bookmarks_extension_id = extension_id.into();
        self
    }

    /// The preference map this loader produces.
    #[must_use]
    pub fn prefs(&self) -> BTreeMap<String, String> {
        let mut prefs = BTreeMap::new();
        prefs.insert(
            format!("{IN_APP_PAYMENTS_SUPPORT_APP_ID}{EXTERNAL_UPDATE_URL_SUFFIX}"),
            WEBSTORE_UPDATE_URL.to_string(),
        );

        let disabled = self.enhanced_bookmarks_switch.as_deref() == Some(SWITCH_DISABLED);
        if !disabled && !self.enhanced_bookmarks_extension_id.is_empty() {
            prefs.insert(
                format!(
                    "{}{EXTERNAL_UPDATE_URL_SUFFIX}",
                    self.enhanced_bookmarks_extension_id
                ),
                WEBSTORE_UPDATE_URL.to_string(),
            );
        }
        prefs
    }

    /// Build the preference map and hand it to `sink`.
    pub fn start_loading(&self, sink: &mut impl LoadFinished) {
        let prefs = self.prefs();
        tracing::debug!(count = prefs.len(), "External component prefs loaded");
        sink.load_finished(prefs);
    }
}
