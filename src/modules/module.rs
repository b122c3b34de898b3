//! # Module definitions and the system map.
//!
//! A [`Module`] is a unit of application functionality: declared dependencies,
//! an opaque state slot, lifecycle tags, named update functions
//! (`start`/`stop`/`pause`/`resume` by convention, open set), an optional
//! export function, and an ordered list of [`Plugin`] overlays.
//!
//! The [`SystemMap`] is the full collection of modules treated as one value.
//! It is cheap to clone (everything inside is shared or small), which is what
//! makes the controller's atomic-looking commit/rollback possible: a
//! transition works on a clone and the committed map is only replaced
//! wholesale.
//!
//! ## Example
//! ```
//! use modvisor::{Module, SystemMap};
//!
//! let system = SystemMap::new()
//!     .with("db", Module::new().with_state(42_u32))
//!     .with(
//!         "web",
//!         Module::new()
//!             .with_deps(["db"])
//!             .on_start(|update| async move { Ok(update.state) }),
//!     );
//!
//! assert!(system.contains("db"));
//! assert_eq!(system.get("db").unwrap().state_as::<u32>().as_deref(), Some(&42));
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::{IndexMap, IndexSet};

use crate::error::StepError;

/// Key identifying a module in the system map. Doubles as the per-module
/// pipeline scope name.
pub type ModuleKey = Arc<str>;

/// Opaque module state. The content belongs to the module author; the slot is
/// written only by the `step` interceptor.
pub type State = Arc<dyn Any + Send + Sync>;

/// A dynamically typed value (dependency export, event payload, extra step
/// argument).
pub type Arg = Arc<dyn Any + Send + Sync>;

/// Extra arguments forwarded to an update function by `steps::step_with`.
pub type Args = Arc<[Arg]>;

/// Value produced by a module's export function.
pub type Export = Arg;

/// Export function: a pure projection of the module's current state.
pub type ExportFn = Arc<dyn Fn(&State) -> Export + Send + Sync>;

/// Update function: consumes the module's state plus its dependency exports
/// and produces the new state (possibly suspending on the way).
pub type UpdateFn = Arc<dyn Fn(Update) -> BoxFuture<'static, Result<State, StepError>> + Send + Sync>;

/// Plugin field wrapper: receives the previously folded update function (or
/// `None` when the field has no earlier definition) and returns the wrapped
/// one.
pub type WrapFn = Arc<dyn Fn(Option<UpdateFn>) -> UpdateFn + Send + Sync>;

/// Arguments handed to an update function.
#[derive(Clone)]
pub struct Update {
    /// The module's current state.
    pub state: State,
    /// One entry per declared dependency: the dependency's export applied to
    /// its current state (unit when the dependency exports nothing).
    pub exports: Exports,
    /// The module's own key.
    pub key: ModuleKey,
    /// Extra arguments supplied via `steps::step_with` (empty otherwise).
    pub args: Args,
}

/// Dependency exports, keyed by dependency module key.
#[derive(Clone, Default)]
pub struct Exports {
    values: HashMap<ModuleKey, Export>,
}

impl Exports {
    /// Typed lookup: downcasts the dependency's export to `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.values.get(key).and_then(|v| v.clone().downcast::<T>().ok())
    }

    /// Untyped lookup.
    pub fn raw(&self, key: &str) -> Option<&Export> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn insert(&mut self, key: ModuleKey, value: Export) {
        self.values.insert(key, value);
    }
}

/// Selector resolving a module's update function.
///
/// Either a named field looked up in the plugin-extended definition, or an
/// arbitrary function applied to it — one explicit lookup path, no duck
/// typing.
#[derive(Clone)]
pub enum Selector {
    /// Look the update function up by field name (`"start"`, `"stop"`, …).
    Field(Cow<'static, str>),
    /// Apply an arbitrary function to the plugin-extended module definition.
    Func(Arc<dyn Fn(&Module) -> Option<UpdateFn> + Send + Sync>),
}

impl Selector {
    /// Named-field selector.
    pub fn field(name: impl Into<Cow<'static, str>>) -> Self {
        Selector::Field(name.into())
    }

    /// Arbitrary-function selector.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Module) -> Option<UpdateFn> + Send + Sync + 'static,
    {
        Selector::Func(Arc::new(f))
    }
}

impl From<&'static str> for Selector {
    fn from(name: &'static str) -> Self {
        Selector::field(name)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Field(name) => write!(f, "Selector::Field({name:?})"),
            Selector::Func(_) => f.write_str("Selector::Func(..)"),
        }
    }
}

/// Ordered partial overlay wrapping a module's update functions.
///
/// For every field a plugin carries, the effective update function is built
/// by folding plugins in order: each wrapper receives the previously folded
/// function and returns its replacement — a decorator chain.
#[derive(Clone, Default)]
pub struct Plugin {
    name: Cow<'static, str>,
    wraps: HashMap<Cow<'static, str>, WrapFn>,
}

impl Plugin {
    /// Creates an empty plugin with the given name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Plugin name (used for merge deduplication).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installs a wrapper for one field.
    pub fn wrap<F>(mut self, field: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Option<UpdateFn>) -> UpdateFn + Send + Sync + 'static,
    {
        self.wraps.insert(field.into(), Arc::new(f));
        self
    }

    fn wrap_for(&self, field: &str) -> Option<&WrapFn> {
        self.wraps.get(field)
    }

    fn fields(&self) -> impl Iterator<Item = &Cow<'static, str>> {
        self.wraps.keys()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("fields", &self.wraps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A unit of application functionality with declared dependencies, opaque
/// state, and lifecycle update functions.
#[derive(Clone)]
pub struct Module {
    deps: BTreeSet<ModuleKey>,
    state: State,
    tags: BTreeSet<Cow<'static, str>>,
    updates: HashMap<Cow<'static, str>, UpdateFn>,
    export: Option<ExportFn>,
    plugins: Vec<Plugin>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Creates an empty module: no deps, unit state, no update functions.
    pub fn new() -> Self {
        Self {
            deps: BTreeSet::new(),
            state: Arc::new(()),
            tags: BTreeSet::new(),
            updates: HashMap::new(),
            export: None,
            plugins: Vec::new(),
        }
    }

    /// Declares dependencies on other modules.
    pub fn with_deps<I, K>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ModuleKey>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Sets the initial state.
    pub fn with_state<T: Any + Send + Sync>(self, state: T) -> Self {
        self.with_state_arc(Arc::new(state))
    }

    /// Sets the initial state from an already-shared value.
    pub fn with_state_arc(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    /// Installs an update function under an arbitrary field name.
    pub fn on_update<F, Fut>(mut self, field: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, StepError>> + Send + 'static,
    {
        let update: UpdateFn = Arc::new(move |u| Box::pin(f(u)));
        self.updates.insert(field.into(), update);
        self
    }

    /// Installs the `start` update function.
    pub fn on_start<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, StepError>> + Send + 'static,
    {
        self.on_update("start", f)
    }

    /// Installs the `stop` update function.
    pub fn on_stop<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, StepError>> + Send + 'static,
    {
        self.on_update("stop", f)
    }

    /// Installs the `pause` update function.
    pub fn on_pause<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, StepError>> + Send + 'static,
    {
        self.on_update("pause", f)
    }

    /// Installs the `resume` update function.
    pub fn on_resume<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Update) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<State, StepError>> + Send + 'static,
    {
        self.on_update("resume", f)
    }

    /// Installs the export function — a pure projection of the state made
    /// visible to dependents.
    pub fn with_export<F>(mut self, f: F) -> Self
    where
        F: Fn(&State) -> Export + Send + Sync + 'static,
    {
        self.export = Some(Arc::new(f));
        self
    }

    /// Appends a plugin overlay.
    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Declared dependencies.
    pub fn deps(&self) -> &BTreeSet<ModuleKey> {
        &self.deps
    }

    /// Current state slot.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Typed view of the state slot.
    pub fn state_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.state.clone().downcast::<T>().ok()
    }

    /// True when the module carries the lifecycle tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Currently set lifecycle tags.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.as_ref())
    }

    /// Export value for the current state (unit when no export function).
    pub fn export_value(&self) -> Export {
        match &self.export {
            Some(f) => f(&self.state),
            None => Arc::new(()),
        }
    }

    /// Resolves the effective update function for a selector against the
    /// plugin-extended definition. `None` when nothing resolves.
    pub fn resolve(&self, selector: &Selector) -> Option<UpdateFn> {
        match selector {
            Selector::Field(name) => self.resolve_field(name),
            Selector::Func(f) => f(&self.extended()),
        }
    }

    /// The plugin-extended definition: every field folded through the plugin
    /// chain, plugins consumed.
    pub fn extended(&self) -> Module {
        let mut fields: IndexSet<Cow<'static, str>> = self.updates.keys().cloned().collect();
        for plugin in &self.plugins {
            fields.extend(plugin.fields().cloned());
        }
        let mut extended = self.clone();
        extended.updates = fields
            .into_iter()
            .filter_map(|field| {
                let folded = self.resolve_field(&field)?;
                Some((field, folded))
            })
            .collect();
        extended.plugins = Vec::new();
        extended
    }

    fn resolve_field(&self, field: &str) -> Option<UpdateFn> {
        let mut current = self.updates.get(field).cloned();
        for plugin in &self.plugins {
            if let Some(wrap) = plugin.wrap_for(field) {
                current = Some(wrap(current));
            }
        }
        current
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub(crate) fn add_tag(&mut self, tag: Cow<'static, str>) {
        self.tags.insert(tag);
    }

    pub(crate) fn remove_tag(&mut self, tag: &str) {
        self.tags.remove(tag);
    }

    pub(crate) fn add_dep(&mut self, key: ModuleKey) {
        self.deps.insert(key);
    }

    /// Field-level merge that never overwrites: fills in update functions,
    /// export, deps, and plugins missing from `self`. Existing state wins.
    pub(crate) fn merge_defaults(&mut self, other: Module) {
        self.deps.extend(other.deps);
        self.tags.extend(other.tags);
        for (field, update) in other.updates {
            self.updates.entry(field).or_insert(update);
        }
        if self.export.is_none() {
            self.export = other.export;
        }
        for plugin in other.plugins {
            if !self.plugins.iter().any(|p| p.name() == plugin.name()) {
                self.plugins.push(plugin);
            }
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("deps", &self.deps)
            .field("tags", &self.tags)
            .field("updates", &self.updates.keys().collect::<Vec<_>>())
            .field("export", &self.export.is_some())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

/// The full collection of module definitions, treated as one value.
///
/// Keys keep insertion order, so "all currently-known modules" is a
/// deterministic sequence.
#[derive(Clone, Debug, Default)]
pub struct SystemMap {
    modules: IndexMap<ModuleKey, Module>,
}

impl SystemMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<ModuleKey>, module: Module) -> Self {
        self.insert(key, module);
        self
    }

    /// Inserts or replaces a module.
    pub fn insert(&mut self, key: impl Into<ModuleKey>, module: Module) -> Option<Module> {
        self.modules.insert(key.into(), module)
    }

    /// Removes a module.
    pub fn remove(&mut self, key: &str) -> Option<Module> {
        self.modules.shift_remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Module> {
        self.modules.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Module> {
        self.modules.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &ModuleKey> {
        self.modules.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleKey, &Module)> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Merges `other` in without overwriting: new modules are added whole,
    /// existing modules are field-merged (existing fields win).
    pub fn merge_defaults(&mut self, other: SystemMap) {
        for (key, module) in other.modules {
            match self.modules.get_mut(&key) {
                Some(existing) => existing.merge_defaults(module),
                None => {
                    self.modules.insert(key, module);
                }
            }
        }
    }

    /// Merges `other` in, replacing any existing module wholesale.
    pub fn merge_override(&mut self, other: SystemMap) {
        for (key, module) in other.modules {
            self.modules.insert(key, module);
        }
    }

    /// Makes every module (except `key` itself) depend on `key`.
    pub(crate) fn depend_all_on(&mut self, key: &str) {
        let dep: ModuleKey = key.into();
        for (k, module) in self.modules.iter_mut() {
            if k.as_ref() != key {
                module.add_dep(dep.clone());
            }
        }
    }

    /// Gathers the exports of a module's declared dependencies.
    pub fn exports_for(&self, key: &str) -> Result<Exports, StepError> {
        let module = self
            .get(key)
            .ok_or_else(|| StepError::fail(format!("module '{key}' missing from system map")))?;
        let mut exports = Exports::default();
        for dep in module.deps() {
            let dep_module = self.get(dep).ok_or_else(|| {
                StepError::fail(format!("dependency '{dep}' of '{key}' missing from system map"))
            })?;
            exports.insert(dep.clone(), dep_module.export_value());
        }
        Ok(exports)
    }
}

impl FromIterator<(ModuleKey, Module)> for SystemMap {
    fn from_iter<I: IntoIterator<Item = (ModuleKey, Module)>>(iter: I) -> Self {
        Self {
            modules: iter.into_iter().collect(),
        }
    }
}
