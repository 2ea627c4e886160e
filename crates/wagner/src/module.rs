//! Modules own a task registry and a service cache, and run invocations

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::cache::ServiceCache;
use crate::context::{Args, Locals};
use crate::error::{BoxError, ModuleError, WagnerResult};
use crate::executor::{self, Invocation};
use crate::graph::{Registry, WorkingGraph};
use crate::target::Target;
use crate::task::{AsyncFn, AsyncProducer, Producer, SyncFn, TaskDef};
use crate::types::ModuleConfig;

/// A named task registry with its own service cache.
///
/// Clones share the service cache but not the registry.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    registry: Registry,
    cache: ServiceCache,
    config: ModuleConfig,
}

impl Module {
    /// Create an empty module with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: Registry::new(),
            cache: ServiceCache::new(),
            config: ModuleConfig::default(),
        }
    }

    /// Create an empty module with custom configuration
    pub fn with_config(name: impl Into<String>, config: ModuleConfig) -> WagnerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(name)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// The registered tasks, in declaration order
    pub fn tasks(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &ServiceCache {
        &self.cache
    }

    /// Register a prebuilt task definition, replacing any task of the same name
    pub fn register(&mut self, task: TaskDef) -> &mut Self {
        debug!(
            module = %self.name,
            task = task.name(),
            kind = ?task.kind(),
            service = task.is_service(),
            "Registering task"
        );
        self.registry.insert(task);
        self
    }

    /// Register a task whose value is returned directly
    pub fn register_sync<T, F>(&mut self, name: &str, dependencies: &[&str], body: F) -> &mut Self
    where
        F: Fn(&Args) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.register(TaskDef::new(name, dependencies, Producer::Sync(Arc::new(SyncFn(body)))))
    }

    /// Register a task whose value is delivered by a future
    pub fn register_async<T, F, Fut>(&mut self, name: &str, dependencies: &[&str], body: F) -> &mut Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.register(TaskDef::new(name, dependencies, Producer::Async(Arc::new(AsyncFn(body)))))
    }

    /// Register an [`AsyncProducer`] implementation
    pub fn register_async_producer<P: AsyncProducer>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        producer: P,
    ) -> &mut Self {
        self.register(TaskDef::new(name, dependencies, Producer::Async(Arc::new(producer))))
    }

    /// Register a synchronous task whose first value is kept for the module lifetime
    pub fn register_service<T, F>(&mut self, name: &str, dependencies: &[&str], body: F) -> &mut Self
    where
        F: Fn(&Args) -> Result<T, BoxError> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        let task = TaskDef::new(name, dependencies, Producer::Sync(Arc::new(SyncFn(body))));
        self.register(task.into_service())
    }

    /// Register an asynchronous task whose first value is kept for the module lifetime
    pub fn register_async_service<T, F, Fut>(&mut self, name: &str, dependencies: &[&str], body: F) -> &mut Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: Any + Send + Sync,
    {
        let task = TaskDef::new(name, dependencies, Producer::Async(Arc::new(AsyncFn(body))));
        self.register(task.into_service())
    }

    /// Register a fixed value under `name`
    pub fn constant<T: Any + Send + Sync>(&mut self, name: &str, value: T) -> &mut Self {
        self.register(TaskDef::new(name, &[], Producer::Constant(Arc::new(value))))
    }

    /// Memoize an already registered task. Modules that imported it keep their own copy.
    pub fn mark_as_service(&mut self, name: &str) -> WagnerResult<&mut Self> {
        self.registry.mark_service(name)?;
        debug!(module = %self.name, task = name, "Marked task as service");
        Ok(self)
    }

    /// Copy every task of `other` into this module as it is right now
    pub fn import(&mut self, other: &Module) -> &mut Self {
        debug!(module = %self.name, from = %other.name, tasks = other.registry.len(), "Importing tasks");
        self.registry.import(&other.registry);
        self
    }

    /// Resolve and run `target` synchronously
    pub fn invoke<R>(&self, target: Target<R>, locals: Locals) -> WagnerResult<R> {
        let graph = WorkingGraph::build(&self.registry, &locals, &self.cache);
        executor::run_sync(&graph, &self.cache, &self.config, target)
    }

    /// Resolve `target` and return an [`Invocation`] that runs it when awaited
    pub fn invoke_async<R: Send + 'static>(&self, target: Target<R>, locals: Locals) -> WagnerResult<Invocation<R>> {
        let graph = WorkingGraph::build(&self.registry, &locals, &self.cache);
        executor::start_async(graph, self.cache.clone(), self.config.clone(), target)
    }

    /// Forget every cached service value. Registrations are kept.
    pub fn clear(&self) {
        debug!(module = %self.name, cached = self.cache.len(), "Clearing service cache");
        self.cache.clear();
    }
}

/// Registry of named modules, linked by copying imports at declaration time
#[derive(Debug, Default)]
pub struct Modules {
    modules: HashMap<String, Module>,
    config: ModuleConfig,
}

impl Modules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for every module declared from now on
    pub fn with_config(config: ModuleConfig) -> WagnerResult<Self> {
        config.validate()?;
        Ok(Self {
            modules: HashMap::new(),
            config,
        })
    }

    /// Declare a module, replacing any module of the same name, and copy the
    /// current tasks of every import into it. Later changes to the imports are
    /// not reflected.
    pub fn declare(&mut self, name: &str, imports: &[&str]) -> WagnerResult<&mut Module> {
        let mut module = Module::with_config(name, self.config.clone())?;
        for import in imports {
            let source = self
                .modules
                .get(*import)
                .ok_or_else(|| ModuleError::UnknownModule(import.to_string()))?;
            module.import(source);
        }

        self.modules.insert(name.to_string(), module);
        self.module_mut(name)
    }

    pub fn module(&self, name: &str) -> WagnerResult<&Module> {
        self.modules
            .get(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()).into())
    }

    pub fn module_mut(&mut self, name: &str) -> WagnerResult<&mut Module> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| ModuleError::UnknownModule(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::WagnerError;

    #[test]
    fn test_sync_service_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut module = Module::new("breakfast");
        module
            .register_service("bacon", &[], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("bacon".to_string())
            })
            .register_service("breakfast", &["bacon"], |args| {
                Ok(format!("{} and eggs", args.get::<String>("bacon")?))
            });

        for _ in 0..2 {
            let meal = module
                .invoke(
                    Target::new(&["breakfast"], |args| args.get::<String>("breakfast").unwrap()),
                    Locals::new(),
                )
                .unwrap();
            assert_eq!(meal, "bacon and eggs");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        module.clear();
        assert!(module.cache().is_empty());
        module.invoke(Target::new(&["breakfast"], |_| ()), Locals::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(module.tasks().len(), 2);
    }

    #[test]
    fn test_mark_as_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut module = Module::new("kitchen");
        module.register_sync("pan", &[], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        module.mark_as_service("pan").unwrap();

        module.invoke(Target::new(&["pan"], |_| ()), Locals::new()).unwrap();
        module.invoke(Target::new(&["pan"], |_| ()), Locals::new()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let error = module.mark_as_service("toast").unwrap_err();
        assert!(matches!(error, WagnerError::Module(ModuleError::UnknownTask(name)) if name == "toast"));
    }

    #[test]
    fn test_constants_and_locals() {
        let mut module = Module::new("numbers");
        module
            .constant("base", 10u32)
            .register_sync("sum", &["base", "number"], |args| {
                Ok(args.get::<u32>("base")? + args.get::<u32>("number")?)
            });

        let sum = module
            .invoke(
                Target::new(&["sum"], |args| args.get::<u32>("sum").unwrap()),
                Locals::new().with("number", 4u32),
            )
            .unwrap();
        assert_eq!(sum, 14);

        let error = module.invoke(Target::new(&["sum"], |_| ()), Locals::new()).unwrap_err();
        assert_eq!(error.to_string(), "Resolve error: No such dependency: number (required by sum)");
    }

    #[test]
    fn test_reserved_target_parameter() {
        let module = Module::new("kitchen");
        let error = module.invoke(Target::new(&["error"], |_| ()), Locals::new()).unwrap_err();
        assert!(matches!(error, WagnerError::Config(_)));
    }

    #[test]
    fn test_declare_copies_imports() {
        let mut modules = Modules::new();
        modules
            .declare("foods", &[])
            .unwrap()
            .register_sync("bacon", &[], |_| Ok("bacon"));
        modules
            .declare("breakfast", &["foods"])
            .unwrap()
            .register_sync("bacon", &[], |_| Ok("turkey bacon"));

        modules
            .module_mut("foods")
            .unwrap()
            .register_sync("eggs", &[], |_| Ok("eggs"));

        let read = |module: &Module| {
            module
                .invoke(Target::new(&["bacon"], |args| args.get::<&str>("bacon").unwrap()), Locals::new())
                .unwrap()
        };
        assert_eq!(read(modules.module("foods").unwrap()), "bacon");
        assert_eq!(read(modules.module("breakfast").unwrap()), "turkey bacon");
        assert!(!modules.module("breakfast").unwrap().tasks().contains("eggs"));

        let error = modules.declare("lunch", &["dinner"]).unwrap_err();
        assert!(matches!(error, WagnerError::Module(ModuleError::UnknownModule(name)) if name == "dinner"));
        assert!(!modules.contains("lunch"));
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn test_with_config_validates() {
        let config = ModuleConfig {
            error_param_names: vec![String::new()],
            ..ModuleConfig::default()
        };
        assert!(Module::with_config("kitchen", config).is_err());
    }
}
