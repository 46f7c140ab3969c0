//! Provides a tiny DI like container to expose all components of the system.
//!
//! The platform is more or less a simple map which keeps all central components (the
//! [Config](crate::config::Config), the [Server](crate::server::Server), the
//! [DocCache](crate::cache::DocCache) and the [DocHandler](crate::handler::DocHandler)) as
//! **Arc<T>** around. Also this keeps the central **is_running** flag which is toggled to
//! *false* once [Platform::terminate](Platform::terminate) is invoked.
//!
//! Note that [Platform::require](Platform::require) is a good way of fetching a component which is
//! known to be there. However, once the system shutdown is initiated, the internal map is cleared
//! (so that all Drop handlers run). Therefore code which might run after
//! [Platform::terminate](Platform::terminate) (like request handling in a connection which is
//! still open) should use [Platform::find](Platform::find) and gracefully handle the **None** case.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use nsdoc::platform::Platform;
//! struct Service {
//!     value : i32
//! }
//!
//! struct UnknownService;
//!
//! let platform = Platform::new();
//!
//! // Registers a new service...
//! platform.register::<Service>(Arc::new(Service { value: 42 }));
//!
//! // Obtains a reference to a previously registered service...
//! let service = platform.require::<Service>();
//! assert_eq!(service.value, 42);
//!
//! // Trying to obtain a service which hasn't been registered yet, returns an empty
//! // optional...
//! assert_eq!(platform.find::<UnknownService>().is_none(), true);
//!
//! // By default the platform is running...
//! assert_eq!(platform.is_running(), true);
//!
//! // Once terminated...
//! platform.terminate();
//! // All services are immediately released so that their Drop handlers run...
//! assert_eq!(platform.find::<Service>().is_none(), true);
//!
//! // and the platform is no longer considered active...
//! assert_eq!(platform.is_running(), false);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Services = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Provides a container to keep all central services in a single place.
pub struct Platform {
    services: Mutex<Services>,
    is_running: AtomicBool,
}

impl Platform {
    /// Creates a new platform instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
        })
    }

    fn services(&self) -> MutexGuard<'_, Services> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new component.
    ///
    /// A component which has previously been registered for the same type is replaced.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self.services().insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered service.
    ///
    /// Note, if one knows for certain, that a service will be present,
    /// [Platform::require](Platform::require) can be used.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.services()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolve a previously registered service.
    ///
    /// Note, if the framework is already shutting down, all services are evicted. Therefore this
    /// might panic even if it worked before [Platform::terminate](Platform::terminate) was invoked.
    ///
    /// # Panics
    /// Panics if the requested service isn't available.
    ///
    /// ```should_panic
    /// # use nsdoc::platform::Platform;
    /// struct UnknownService;
    ///
    /// let platform = Platform::new();
    ///
    /// // This will panic...
    /// platform.require::<UnknownService>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            );
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "A required component ({}) was not available in the platform registry!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running or if [Platform::terminate](Platform::terminate)
    /// has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This will immediately release all services (so that the Drop handlers run eventually).
    /// It will also toggle the [is_running()](Platform::is_running) flag to **false**, which makes
    /// the [Server](crate::server::Server) close its socket and all open connections.
    pub fn terminate(&self) {
        self.services().clear();
        self.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::platform::Platform;

    struct Counter(i32);

    #[test]
    fn registering_twice_replaces_the_component() {
        let platform = Platform::new();
        platform.register(Arc::new(Counter(1)));
        platform.register(Arc::new(Counter(2)));

        assert_eq!(platform.require::<Counter>().0, 2);
    }

    #[test]
    fn held_components_survive_termination() {
        let platform = Platform::new();
        platform.register(Arc::new(Counter(42)));
        let counter = platform.require::<Counter>();

        platform.terminate();

        assert!(platform.find::<Counter>().is_none());
        assert_eq!(counter.0, 42);
    }
}
