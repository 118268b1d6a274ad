//! Provider resolution for application instances.
//!
//! Values are registered as [`Provider`]s under a string key and resolved
//! through typed [`InjectionToken`]s. A later provider with the same key
//! replaces an earlier one, so per-render providers override the base list
//! from the setup options.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ssr_engine_common::RenderError;

use crate::app::{ApplicationRef, PlatformState};
use crate::context::{InitialConfig, RenderRequest, ResponseHandle};

type ProvidedValue = Arc<dyn Any + Send + Sync>;

/// A typed key for resolving a value from an [`Injector`].
pub struct InjectionToken<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InjectionToken<T> {
    /// Create a token with the given key.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key this token resolves.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for InjectionToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InjectionToken({})", self.name)
    }
}

/// The request being rendered.
pub const REQUEST: InjectionToken<RenderRequest> = InjectionToken::new("REQUEST");

/// The response of the render, when the caller supplied one.
pub const RESPONSE: InjectionToken<ResponseHandle> = InjectionToken::new("RESPONSE");

/// Shell document and URL the application starts from.
pub const INITIAL_CONFIG: InjectionToken<InitialConfig> = InjectionToken::new("INITIAL_CONFIG");

/// Document-state holder, provided by the platform.
pub const PLATFORM_STATE: InjectionToken<PlatformState> = InjectionToken::new("PLATFORM_STATE");

/// Stability source, provided by the platform.
pub const APPLICATION_REF: InjectionToken<ApplicationRef> = InjectionToken::new("APPLICATION_REF");

/// A value registered under a key.
#[derive(Clone)]
pub struct Provider {
    key: Cow<'static, str>,
    value: ProvidedValue,
}

impl Provider {
    /// Provide `value` for `token`.
    pub fn value<T: Any + Send + Sync>(token: &InjectionToken<T>, value: T) -> Self {
        Self::shared(token, Arc::new(value))
    }

    /// Provide an already shared value for `token`.
    pub fn shared<T: Any + Send + Sync>(token: &InjectionToken<T>, value: Arc<T>) -> Self {
        Self {
            key: Cow::Borrowed(token.name),
            value,
        }
    }

    /// Provide a JSON value under a key chosen at runtime (e.g. from a config file).
    pub fn json(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: Cow::Owned(key.into()),
            value: Arc::new(value),
        }
    }

    /// The key this provider is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Resolves provided values by key.
#[derive(Clone, Default)]
pub struct Injector {
    providers: HashMap<Cow<'static, str>, ProvidedValue>,
}

impl Injector {
    /// Build an injector; later providers override earlier ones.
    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> Self {
        let mut injector = Self::default();
        for provider in providers {
            injector.provide(provider);
        }
        injector
    }

    /// Register a provider, replacing any value under the same key.
    pub fn provide(&mut self, provider: Provider) {
        self.providers.insert(provider.key, provider.value);
    }

    /// Resolve the value for `token`.
    ///
    /// Returns `None` when nothing is registered under the token's key or
    /// when the registered value has a different type.
    pub fn get<T: Any + Send + Sync>(&self, token: &InjectionToken<T>) -> Option<Arc<T>> {
        self.get_by_key(token.name)
    }

    /// Resolve the value for `token`, failing with [`RenderError::MissingProvider`].
    pub fn require<T: Any + Send + Sync>(
        &self,
        token: &InjectionToken<T>,
    ) -> Result<Arc<T>, RenderError> {
        self.get(token)
            .ok_or_else(|| RenderError::missing_provider(token.name))
    }

    /// Resolve a value registered under a runtime key.
    pub fn get_by_key<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.providers
            .get(key)
            .and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Check whether anything is registered under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.providers.keys().map(AsRef::as_ref).collect();
        keys.sort_unstable();
        f.debug_struct("Injector").field("keys", &keys).finish()
    }
}
