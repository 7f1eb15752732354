// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical configuration reader.
//!
//! [`ConfigReader`] resolves keys against an ordered list of providers. The
//! first provider with a value for a key wins. Readers are immutable and cheap
//! to clone; scoped readers share the providers of their parent.

use crate::domain::{ConfigError, ConfigKey, ConfigValue, FromConfigValue, Result};
use crate::ports::{ConfigProvider, WatchableProvider};
use std::fmt;
use std::sync::Arc;

/// A provider together with the capability it was registered with.
#[derive(Clone)]
pub enum ProviderEntry {
    /// Snapshot-readable only.
    Static(Arc<dyn ConfigProvider>),
    /// Snapshot-readable and watchable.
    Watchable(Arc<dyn WatchableProvider>),
}

impl ProviderEntry {
    /// Returns the provider name.
    pub fn name(&self) -> &str {
        match self {
            ProviderEntry::Static(p) => p.name(),
            ProviderEntry::Watchable(p) => p.name(),
        }
    }

    /// Looks `key` up in the provider's current state.
    pub fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        match self {
            ProviderEntry::Static(p) => p.lookup(key),
            ProviderEntry::Watchable(p) => p.lookup(key),
        }
    }

    /// Returns `true` when the provider was registered as watchable.
    pub fn is_watchable(&self) -> bool {
        matches!(self, ProviderEntry::Watchable(_))
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_watchable() {
            "Watchable"
        } else {
            "Static"
        };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}

/// Resolves configuration keys against an ordered list of providers.
///
/// Providers are queried in the order they were added to the builder; the
/// first one returning a value wins. Nothing is cached, so every call observes
/// the providers' current state.
///
/// # Examples
///
/// ```rust
/// use stratacfg::adapters::InMemoryProvider;
/// use stratacfg::service::ConfigReader;
///
/// # fn main() -> stratacfg::domain::Result<()> {
/// let overrides = InMemoryProvider::new("overrides", [("http.port", 9090i64)]);
/// let defaults = InMemoryProvider::new("defaults", [("http.port", 8080i64), ("http.host", 0i64)]);
///
/// let reader = ConfigReader::builder()
///     .with_provider(overrides)
///     .with_provider(defaults)
///     .build()?;
///
/// assert_eq!(reader.int("http.port")?, Some(9090));
///
/// let http = reader.scoped("http");
/// assert_eq!(http.int("port")?, Some(9090));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConfigReader {
    providers: Arc<[ProviderEntry]>,
    scope: Option<ConfigKey>,
}

impl ConfigReader {
    /// Creates a reader over `providers`, highest priority first.
    pub fn new(providers: Vec<ProviderEntry>) -> Self {
        Self {
            providers: providers.into(),
            scope: None,
        }
    }

    /// Creates a new reader builder.
    pub fn builder() -> ConfigReaderBuilder {
        ConfigReaderBuilder::new()
    }

    /// Creates a reader with the default providers.
    ///
    /// In priority order: the process command line, the environment and the
    /// `config.yaml` file in the OS-specific configuration directory for the
    /// application, when it exists.
    ///
    /// # Arguments
    ///
    /// * `app_name` - The application name
    /// * `qualifier` - The organization/qualifier (e.g., "com.example")
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stratacfg::service::ConfigReader;
    ///
    /// # fn main() -> stratacfg::domain::Result<()> {
    /// let reader = ConfigReader::with_defaults("myapp", "com.example")?;
    /// # Ok(())
    /// # }
    /// ```
    #[allow(unused_variables, unused_mut)]
    pub fn with_defaults(app_name: &str, qualifier: &str) -> Result<Self> {
        let mut builder = Self::builder();

        #[cfg(feature = "cli")]
        {
            use crate::adapters::CommandLineProvider;
            builder = builder.with_provider(CommandLineProvider::from_env_args());
        }

        #[cfg(feature = "env")]
        {
            builder = builder.with_env_vars();
        }

        #[cfg(feature = "yaml")]
        {
            use crate::adapters::YamlFileProvider;
            match YamlFileProvider::from_default_location(app_name, qualifier) {
                Ok(provider) => builder = builder.with_provider(provider),
                Err(e) => tracing::debug!(error = %e, "no default YAML configuration loaded"),
            }
        }

        builder.build()
    }

    /// Returns the providers, highest priority first.
    pub fn providers(&self) -> &[ProviderEntry] {
        &self.providers
    }

    /// Returns the scope prefix of this reader, if any.
    pub fn scope(&self) -> Option<&ConfigKey> {
        self.scope.as_ref()
    }

    /// Returns a reader resolving every key under `prefix`.
    ///
    /// Scoping composes: `reader.scoped("a").scoped("b")` reads `a.b.*`.
    pub fn scoped(&self, prefix: impl Into<ConfigKey>) -> ConfigReader {
        let prefix = prefix.into();
        let scope = match &self.scope {
            Some(current) => prefix.scoped(current),
            None => prefix,
        };
        ConfigReader {
            providers: Arc::clone(&self.providers),
            scope: Some(scope),
        }
    }

    /// Maps a key relative to this reader to the key providers see.
    pub fn absolute_key(&self, key: impl Into<ConfigKey>) -> ConfigKey {
        let key = key.into();
        match &self.scope {
            Some(scope) => key.scoped(scope),
            None => key,
        }
    }

    /// Resolves `key` against the providers.
    ///
    /// Returns `Ok(None)` when no provider has a value. A failing provider
    /// fails the whole lookup; lower-priority providers are not consulted.
    pub fn get(&self, key: impl Into<ConfigKey>) -> Result<Option<ConfigValue>> {
        let key = self.absolute_key(key);
        self.resolve(&key)
    }

    pub(crate) fn resolve(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
        for provider in self.providers.iter() {
            match provider.lookup(key) {
                Ok(Some(value)) => {
                    tracing::trace!(key = %key, provider = provider.name(), "resolved configuration key");
                    return Ok(Some(value));
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(
                        "Error querying provider '{}' for key '{}': {}",
                        provider.name(),
                        key,
                        e
                    );
                    return Err(e);
                }
            }
        }
        tracing::trace!(key = %key, "configuration key not defined");
        Ok(None)
    }

    /// Returns `true` if any provider has a value for `key`.
    pub fn has(&self, key: impl Into<ConfigKey>) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Resolves `key` and converts the value to `T`.
    ///
    /// An absent key yields `Ok(None)`; a present value that cannot be
    /// converted yields `ConfigError::Coercion`.
    pub fn get_as<T: FromConfigValue>(&self, key: impl Into<ConfigKey>) -> Result<Option<T>> {
        let key = self.absolute_key(key);
        self.resolve(&key)?
            .map(|value| value.coerce(&key))
            .transpose()
    }

    /// Like [`get_as`](Self::get_as) but falls back to `default` when absent.
    ///
    /// Conversion failures are still reported.
    pub fn get_or<T: FromConfigValue>(&self, key: impl Into<ConfigKey>, default: T) -> Result<T> {
        Ok(self.get_as(key)?.unwrap_or(default))
    }

    /// Like [`get_as`](Self::get_as) but an absent key is an error.
    pub fn require<T: FromConfigValue>(&self, key: impl Into<ConfigKey>) -> Result<T> {
        let key = self.absolute_key(key);
        match self.resolve(&key)? {
            Some(value) => value.coerce(&key),
            None => Err(ConfigError::ConfigKeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Resolves a string value.
    pub fn string(&self, key: impl Into<ConfigKey>) -> Result<Option<String>> {
        self.get_as(key)
    }

    /// Resolves a string value with a default.
    pub fn string_or(&self, key: impl Into<ConfigKey>, default: impl Into<String>) -> Result<String> {
        self.get_or(key, default.into())
    }

    /// Resolves an integer value.
    pub fn int(&self, key: impl Into<ConfigKey>) -> Result<Option<i64>> {
        self.get_as(key)
    }

    /// Resolves an integer value with a default.
    pub fn int_or(&self, key: impl Into<ConfigKey>, default: i64) -> Result<i64> {
        self.get_or(key, default)
    }

    /// Resolves a floating point value.
    pub fn double(&self, key: impl Into<ConfigKey>) -> Result<Option<f64>> {
        self.get_as(key)
    }

    /// Resolves a floating point value with a default.
    pub fn double_or(&self, key: impl Into<ConfigKey>, default: f64) -> Result<f64> {
        self.get_or(key, default)
    }

    /// Resolves a boolean value.
    pub fn bool(&self, key: impl Into<ConfigKey>) -> Result<Option<bool>> {
        self.get_as(key)
    }

    /// Resolves a boolean value with a default.
    pub fn bool_or(&self, key: impl Into<ConfigKey>, default: bool) -> Result<bool> {
        self.get_or(key, default)
    }

    /// Resolves a byte string. Only `Bytes` values qualify.
    pub fn bytes(&self, key: impl Into<ConfigKey>) -> Result<Option<Vec<u8>>> {
        let key = self.absolute_key(key);
        match self.resolve(&key)? {
            Some(ConfigValue::Bytes(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(ConfigError::Coercion {
                key: key.to_string(),
                found: other.kind(),
                requested: "bytes",
                source: None,
            }),
            None => Ok(None),
        }
    }

    /// Resolves a list of strings.
    pub fn string_list(&self, key: impl Into<ConfigKey>) -> Result<Option<Vec<String>>> {
        self.get_as(key)
    }
}

impl fmt::Debug for ConfigReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigReader")
            .field("providers", &self.providers)
            .field("scope", &self.scope.as_ref().map(ConfigKey::dotted))
            .finish()
    }
}

/// Builder for constructing a [`ConfigReader`].
///
/// Providers are queried in the order they are added: the first one added
/// has the highest priority.
///
/// # Examples
///
/// ```rust
/// use stratacfg::service::ConfigReaderBuilder;
///
/// # fn main() -> stratacfg::domain::Result<()> {
/// let reader = ConfigReaderBuilder::new()
///     .with_cli_args(vec!["prog", "--log-level", "debug"])
///     .with_env_vars()
///     .build()?;
/// assert_eq!(reader.string("logLevel")?.as_deref(), Some("debug"));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ConfigReaderBuilder {
    providers: Vec<ProviderEntry>,
    scope: Option<ConfigKey>,
}

impl ConfigReaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a snapshot-readable provider.
    ///
    /// The provider only contributes its value at subscription time to
    /// watches.
    pub fn with_provider(self, provider: impl ConfigProvider + 'static) -> Self {
        self.with_entry(ProviderEntry::Static(Arc::new(provider)))
    }

    /// Adds a watchable provider.
    pub fn with_watchable_provider(self, provider: Arc<dyn WatchableProvider>) -> Self {
        self.with_entry(ProviderEntry::Watchable(provider))
    }

    /// Adds an already classified provider.
    pub fn with_entry(mut self, entry: ProviderEntry) -> Self {
        self.providers.push(entry);
        self
    }

    /// Adds the process environment as a provider.
    #[cfg(feature = "env")]
    pub fn with_env_vars(self) -> Self {
        use crate::adapters::EnvVarProvider;
        self.with_provider(EnvVarProvider::new())
    }

    /// Adds the environment variables starting with `prefix` as a provider.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stratacfg::service::ConfigReaderBuilder;
    ///
    /// # fn main() -> stratacfg::domain::Result<()> {
    /// let reader = ConfigReaderBuilder::new()
    ///     .with_env_prefix("MYAPP_")
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "env")]
    pub fn with_env_prefix(self, prefix: impl Into<String>) -> Self {
        use crate::adapters::EnvVarProvider;
        self.with_provider(EnvVarProvider::with_prefix(prefix))
    }

    /// Adds command-line arguments as a provider.
    ///
    /// The first element is the program name and is skipped.
    #[cfg(feature = "cli")]
    pub fn with_cli_args<S: AsRef<str>>(self, args: Vec<S>) -> Self {
        use crate::adapters::CommandLineProvider;
        self.with_provider(CommandLineProvider::from_args(args))
    }

    /// Adds a YAML file as a provider.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stratacfg::service::ConfigReaderBuilder;
    ///
    /// # fn main() -> stratacfg::domain::Result<()> {
    /// let reader = ConfigReaderBuilder::new()
    ///     .with_yaml_file("/etc/myapp/config.yaml")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[cfg(feature = "yaml")]
    pub fn with_yaml_file(self, path: impl AsRef<std::path::Path>) -> Result<Self> {
        use crate::adapters::YamlFileProvider;
        let provider = YamlFileProvider::from_file(path)?;
        Ok(self.with_provider(provider))
    }

    /// Scopes the built reader under `prefix`.
    pub fn with_scope(mut self, prefix: impl Into<ConfigKey>) -> Self {
        self.scope = Some(prefix.into());
        self
    }

    /// Builds the reader.
    pub fn build(self) -> Result<ConfigReader> {
        tracing::debug!(
            providers = ?self.providers.iter().map(ProviderEntry::name).collect::<Vec<_>>(),
            "building configuration reader"
        );
        let reader = ConfigReader::new(self.providers);
        Ok(match self.scope {
            Some(scope) => reader.scoped(scope),
            None => reader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockProvider {
        name: String,
        values: HashMap<ConfigKey, ConfigValue>,
        lookups: AtomicUsize,
        fail: bool,
    }

    impl MockProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                values: HashMap::new(),
                lookups: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn with_value(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
            self.values.insert(ConfigKey::from(key), value.into());
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl ConfigProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn lookup(&self, key: &ConfigKey) -> Result<Option<ConfigValue>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ConfigError::provider(&self.name, "unavailable"));
            }
            Ok(self.values.get(key).cloned())
        }
    }

    #[test]
    fn test_reader_empty() {
        let reader = ConfigReader::builder().build().unwrap();
        assert!(reader.providers().is_empty());
        assert_eq!(reader.get("anything").unwrap(), None);
    }

    #[test]
    fn test_reader_precedence_is_insertion_order() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("high").with_value("key", "high_value"))
            .with_provider(MockProvider::new("medium").with_value("key", "medium_value"))
            .with_provider(MockProvider::new("low").with_value("key", "low_value"))
            .build()
            .unwrap();

        assert_eq!(reader.providers()[0].name(), "high");
        assert_eq!(reader.string("key").unwrap().as_deref(), Some("high_value"));
    }

    #[test]
    fn test_reader_falls_through_to_lower_priority() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("high"))
            .with_provider(MockProvider::new("low").with_value("key", "low_value"))
            .build()
            .unwrap();

        assert_eq!(reader.string("key").unwrap().as_deref(), Some("low_value"));
    }

    #[test]
    fn test_reader_provider_error_is_propagated() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("broken").failing())
            .with_provider(MockProvider::new("low").with_value("key", "value"))
            .build()
            .unwrap();

        let err = reader.get("key").unwrap_err();
        assert!(matches!(err, ConfigError::ProviderFailure { .. }));
    }

    #[test]
    fn test_reader_does_not_cache() {
        let provider = Arc::new(MockProvider::new("test").with_value("key", "value"));
        let reader = ConfigReader::new(vec![ProviderEntry::Static(provider.clone())]);

        reader.get("key").unwrap();
        reader.get("key").unwrap();
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reader_scoped() {
        let reader = ConfigReader::builder()
            .with_provider(
                MockProvider::new("test")
                    .with_value("http.server.port", 8080i64)
                    .with_value("port", 1i64),
            )
            .build()
            .unwrap();

        let http = reader.scoped("http");
        let server = http.scoped("server");
        assert_eq!(server.int("port").unwrap(), Some(8080));
        assert_eq!(server.scope().unwrap().dotted(), "http.server");
        assert_eq!(reader.int("http.server.port").unwrap(), Some(8080));
        assert_eq!(
            server.absolute_key("port"),
            ConfigKey::from("http.server.port")
        );
    }

    #[test]
    fn test_reader_builder_scope() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("test").with_value("db.host", "localhost"))
            .with_scope("db")
            .build()
            .unwrap();
        assert_eq!(reader.string("host").unwrap().as_deref(), Some("localhost"));
    }

    #[test]
    fn test_reader_typed_accessors() {
        let reader = ConfigReader::builder()
            .with_provider(
                MockProvider::new("test")
                    .with_value("port", "8080")
                    .with_value("ratio", 0.5)
                    .with_value("enabled", "yes")
                    .with_value("blob", vec![1u8, 2, 3])
                    .with_value(
                        "hosts",
                        vec![ConfigValue::from("a"), ConfigValue::from("b")],
                    ),
            )
            .build()
            .unwrap();

        assert_eq!(reader.int("port").unwrap(), Some(8080));
        assert_eq!(reader.double("ratio").unwrap(), Some(0.5));
        assert_eq!(reader.bool("enabled").unwrap(), Some(true));
        assert_eq!(reader.bytes("blob").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(
            reader.string_list("hosts").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(reader.int_or("missing", 7).unwrap(), 7);
        assert_eq!(reader.string_or("missing", "dflt").unwrap(), "dflt");
        assert!(reader.bool_or("missing", true).unwrap());
        assert_eq!(reader.double_or("missing", 1.5).unwrap(), 1.5);
    }

    #[test]
    fn test_reader_coercion_error_is_not_defaulted() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("test").with_value("port", "eighty"))
            .build()
            .unwrap();

        assert!(reader.int_or("port", 80).unwrap_err().is_coercion());
        assert!(reader.bytes("port").unwrap_err().is_coercion());
    }

    #[test]
    fn test_reader_require() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("test").with_value("key", "value"))
            .build()
            .unwrap();

        assert_eq!(reader.require::<String>("key").unwrap(), "value");
        assert!(matches!(
            reader.require::<String>("nonexistent").unwrap_err(),
            ConfigError::ConfigKeyNotFound { .. }
        ));
    }

    #[test]
    fn test_reader_has() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("test").with_value("key", "value"))
            .build()
            .unwrap();

        assert!(reader.has("key").unwrap());
        assert!(!reader.has("nonexistent").unwrap());
    }

    #[test]
    fn test_reader_clones_share_providers() {
        let reader = ConfigReader::builder()
            .with_provider(MockProvider::new("test"))
            .build()
            .unwrap();
        let scoped = reader.scoped("a");
        assert!(Arc::ptr_eq(&reader.providers, &scoped.providers));
        assert!(format!("{:?}", scoped).contains("Static"));
    }
}
