//! Monitored redis connections with [`jatsl`] interop
//!
//! Connections established here register a [`TaskResourceHandle`] with the job
//! supervisor. When a command fails with a connectivity error, the handle is
//! notified and the owning job gets restarted with a fresh connection. The
//! multiplexed connection is a guarded process singleton: it is created at
//! most once, shared by everybody and invalidated for all users at once when
//! it dies.

use crate::library::communication::implementation::redis::{
    RedisFactory, RedisListStore, RedisLogStore,
};
use crate::library::communication::TransportError;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::lock::{Mutex, MutexGuard};
use jatsl::{TaskManager, TaskResourceHandle};
use lazy_static::lazy_static;
use redis::aio::{Connection, ConnectionLike, MultiplexedConnection};
use redis::{Client, Cmd, Pipeline, RedisError, RedisFuture, RedisResult, Value};
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio::task::yield_now;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(2);
const CONNECT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

type SharedMultiplexedConnectionFuture = Shared<BoxFuture<'static, MultiplexedConnection>>;

lazy_static! {
    static ref SHARED_CONNECTION: Mutex<Option<Arc<SharedMultiplexedConnectionFuture>>> =
        Mutex::new(None);
    static ref SHARED_TASK_RESOURCE_HANDLES: Mutex<HashSet<TaskResourceHandle>> =
        Mutex::new(HashSet::new());
}

#[derive(Clone)]
struct HandleRegistration {
    tx: TaskResourceHandle,
    is_shared: bool,
}

impl Deref for HandleRegistration {
    type Target = TaskResourceHandle;

    fn deref(&self) -> &Self::Target {
        &self.tx
    }
}

impl DerefMut for HandleRegistration {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.tx
    }
}

impl Drop for HandleRegistration {
    fn drop(&mut self) {
        if self.is_shared {
            // Lazily deregister the handle from the shared invalidation list
            let handle = self.tx.clone();
            task::spawn(async {
                let handle = handle;
                SHARED_TASK_RESOURCE_HANDLES.lock().await.remove(&handle);
            });
        }
    }
}

/// Redis connection that monitors for connection errors
pub struct RedisResource<C: ConnectionLike> {
    con: C,
    handle: HandleRegistration,
}

impl RedisResource<MultiplexedConnection> {
    /// Retrieves the shared redis connection or establishes it if it doesn't exist
    pub async fn shared(handle: TaskResourceHandle, url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;

        let shared_con_lock = SHARED_CONNECTION.lock().await;

        let future = match &(*shared_con_lock) {
            Some(existing) => existing.clone(),
            None => RedisResource::store_new_shared_future(client, shared_con_lock),
        };

        let con = (*future).clone().await;

        SHARED_TASK_RESOURCE_HANDLES
            .lock()
            .await
            .insert(handle.clone());

        Ok(Self {
            con,
            handle: HandleRegistration {
                is_shared: true,
                tx: handle,
            },
        })
    }

    fn store_new_shared_future(
        client: Client,
        mut shared_con_lock: MutexGuard<Option<Arc<SharedMultiplexedConnectionFuture>>>,
    ) -> Arc<SharedMultiplexedConnectionFuture> {
        let future = RedisResource::connect_shared(client).boxed().shared();
        let arc_future = Arc::new(future);
        *shared_con_lock = Some(arc_future.clone());

        arc_future
    }

    async fn connect_shared(client: Client) -> MultiplexedConnection {
        let mut warn_once = true;

        loop {
            let con_future = client.get_multiplexed_tokio_connection();

            match timeout(CONNECT_REQUEST_TIMEOUT, con_future).await {
                Ok(Ok(connection)) => return connection,
                Ok(Err(e)) => {
                    if warn_once {
                        warn_once = false;
                        warn!("Unable to connect to redis server! ({})", e)
                    }
                }
                Err(e) => {
                    if warn_once {
                        warn_once = false;
                        warn!("Timed out while connecting to redis! ({})", e)
                    }
                }
            }

            sleep(CONNECT_RETRY_INTERVAL).await;
        }
    }
}

impl RedisResource<Connection> {
    /// Establishes a new dedicated redis connection
    pub async fn new(handle: TaskResourceHandle, url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let con = RedisResource::connect_standalone(client).await;

        Ok(Self {
            con,
            handle: HandleRegistration {
                is_shared: false,
                tx: handle,
            },
        })
    }

    async fn connect_standalone(client: Client) -> Connection {
        let mut warn_once = true;

        loop {
            let con_future = client.get_async_connection();

            match timeout(CONNECT_REQUEST_TIMEOUT, con_future).await {
                Ok(Ok(connection)) => return connection,
                Ok(Err(e)) => {
                    if warn_once {
                        warn_once = false;
                        warn!("Unable to connect to redis server! ({})", e)
                    }
                }
                Err(e) => {
                    if warn_once {
                        warn_once = false;
                        warn!("Timed out while connecting to redis! ({})", e)
                    }
                }
            }

            sleep(CONNECT_RETRY_INTERVAL).await;
        }
    }
}

impl<C: ConnectionLike> RedisResource<C> {
    async fn notify(&mut self, error: &RedisError) {
        debug!("{:?}", error);
        self.handle.resource_died().await;

        if self.handle.is_shared {
            // Invalidate the shared connection for everybody
            *(SHARED_CONNECTION.lock().await) = None;

            let handles = SHARED_TASK_RESOURCE_HANDLES.lock().await;
            debug!("Calling {} shared termination handles", handles.len());
            for handle in handles.iter() {
                handle.clone().resource_died().await;
            }
        }

        yield_now().await;
    }
}

/// Handle a redis command result.
macro_rules! notify_if_disconnected {
    ($self:expr, $result:expr) => {
        if let Err(ref e) = $result {
            if e.is_connection_dropped()
                || e.is_io_error()
                || e.is_connection_refusal()
                || e.is_timeout()
            {
                $self.notify(e).await;
            }
        }
    };
}

impl<C: ConnectionLike + Send> ConnectionLike for RedisResource<C> {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        (async move {
            let result = self.con.req_packed_command(cmd).await;
            notify_if_disconnected!(self, result);
            result
        })
        .boxed()
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        (async move {
            let result = self.con.req_packed_commands(cmd, offset, count).await;
            notify_if_disconnected!(self, result);
            result
        })
        .boxed()
    }

    fn get_db(&self) -> i64 {
        self.con.get_db()
    }
}

/// Factory to provide [`TaskResourceHandle`] instances
pub trait ResourceHandleProvider {
    /// Instantiates a new [`TaskResourceHandle`]
    fn create_handle(&self) -> TaskResourceHandle;
}

/// Stub resource handle provider
///
/// Creates new instances using [`TaskResourceHandle::stub()`] for situations
/// where no job supervision is in place, e.g. one-shot administrative
/// commands.
pub struct DummyResourceHandleProvider {}

impl DummyResourceHandleProvider {
    /// Creates a new instance wrapped in an [`Arc`]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {})
    }
}

impl ResourceHandleProvider for DummyResourceHandleProvider {
    fn create_handle(&self) -> TaskResourceHandle {
        TaskResourceHandle::stub()
    }
}

impl<C> ResourceHandleProvider for TaskManager<C> {
    fn create_handle(&self) -> TaskResourceHandle {
        self.create_resource_handle()
    }
}

/// Dynamic dispatch version of [`ResourceHandleProvider`]
pub type BoxedResourceHandleProvider = Arc<dyn ResourceHandleProvider + Send + Sync>;

/// [`RedisFactory`] implementation dispensing monitored connections
pub struct MonitoredRedisFactory {
    url: String,
    handle_provider: BoxedResourceHandleProvider,
}

impl MonitoredRedisFactory {
    /// Creates a new factory opening connections to the given URL
    pub fn new(url: String, handle_provider: BoxedResourceHandleProvider) -> Self {
        Self {
            url,
            handle_provider,
        }
    }
}

#[async_trait]
impl RedisFactory for MonitoredRedisFactory {
    type SharedConnection = RedisResource<MultiplexedConnection>;
    type OwnedConnection = RedisResource<Connection>;

    async fn shared(&self) -> Result<Self::SharedConnection, TransportError> {
        let handle = self.handle_provider.create_handle();
        Ok(RedisResource::shared(handle, &self.url).await?)
    }

    async fn owned(&self) -> Result<Self::OwnedConnection, TransportError> {
        let handle = self.handle_provider.create_handle();
        Ok(RedisResource::new(handle, &self.url).await?)
    }
}

/// Explicitly constructed broker handle, passed down from the process entry point
///
/// Bundles the connection parameters with a resource handle provider and
/// dispenses the concrete store implementations the delivery primitives run
/// on. Lifecycle is owned by whoever created it; there is no hidden
/// module-level instance.
pub struct RedisBroker {
    url: String,
    handle_provider: BoxedResourceHandleProvider,
}

impl RedisBroker {
    /// Creates a new instance which connects to the given URL and reports
    /// connection state through handles from the given provider
    pub fn new(url: String, handle_provider: BoxedResourceHandleProvider) -> Self {
        Self {
            url,
            handle_provider,
        }
    }

    fn factory(&self) -> MonitoredRedisFactory {
        MonitoredRedisFactory::new(self.url.clone(), self.handle_provider.clone())
    }

    /// Instantiates a log store backed by this broker
    pub fn log_store(&self) -> RedisLogStore<MonitoredRedisFactory> {
        RedisLogStore::new(self.factory())
    }

    /// Instantiates a list store backed by this broker
    pub fn list_store(&self) -> RedisListStore<MonitoredRedisFactory> {
        RedisListStore::new(self.factory())
    }
}
