//! In-memory cluster API and recording handlers shared by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crd_operator::error::ClusterError;
use crd_operator::kubernetes::{
    ClusterApi, CustomResource, EventType, HandlerFactory, ResourceHandler, ResourceKind,
    ShutdownTrigger, StatusStore, WatchEvent, WatchStream,
};
use futures_util::stream::{self, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use serde_json::{json, Value};

pub fn postgres_kind() -> Arc<ResourceKind> {
    Arc::new(ResourceKind::new(
        "postgres.example.com",
        "v1alpha1",
        "PostgresDatabase",
        "postgresdatabases",
        "postgresdatabase",
    ))
}

/// A PostgresDatabase object with an empty status
pub fn database(name: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "postgres.example.com/v1alpha1",
        "kind": "PostgresDatabase",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "uid": format!("uid-{}", name),
            "resourceVersion": "1",
        },
        "spec": {
            "dbName": name,
        },
        "status": {}
    })
}

pub fn event(event_type: EventType, object: Value) -> Result<WatchEvent, ClusterError> {
    Ok(WatchEvent::new(event_type, object))
}

/// RFC 7386 JSON merge patch
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(fields) => {
            if !target.is_object() {
                *target = json!({});
            }
            if let Value::Object(target) = target {
                for (key, value) in fields {
                    if value.is_null() {
                        target.remove(key);
                    } else {
                        merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

/// What the next call to `watch` returns
pub enum WatchScript {
    Events(Vec<Result<WatchEvent, ClusterError>>),
    /// ADDED for every stored object, as the server does for a fresh watch
    ReplayAdded,
    FailToOpen(ClusterError),
}

type ObjectKey = (Option<String>, String);

#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    crds: Mutex<BTreeMap<String, CustomResourceDefinition>>,
    scripts: Mutex<VecDeque<WatchScript>>,
    stop_when_exhausted: Mutex<Option<ShutdownTrigger>>,
    create_crd_error: Mutex<Option<ClusterError>>,
    get_crd_error: Mutex<Option<ClusterError>>,
    watched_namespaces: Mutex<Vec<Option<String>>>,
    pub gets: AtomicUsize,
    pub object_patches: AtomicUsize,
    pub status_patches: AtomicUsize,
    pub crd_creates: AtomicUsize,
    resource_version: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn key(object: &Value) -> ObjectKey {
        (
            object
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .map(str::to_string),
            object
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )
    }

    pub fn insert(&self, object: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(&object), object);
    }

    pub fn object(&self, name: &str, namespace: Option<&str>) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.map(str::to_string), name.to_string()))
            .cloned()
    }

    /// Applies `patch` directly, as another writer would
    pub fn patch_directly(&self, name: &str, namespace: Option<&str>, patch: Value) {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(namespace.map(str::to_string), name.to_string()))
            .unwrap();
        merge_patch(object, &patch);
    }

    pub fn script(&self, script: WatchScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Fires `trigger` once every scripted watch has been consumed
    pub fn stop_when_exhausted(&self, trigger: ShutdownTrigger) {
        *self.stop_when_exhausted.lock().unwrap() = Some(trigger);
    }

    pub fn fail_next_crd_create(&self, error: ClusterError) {
        *self.create_crd_error.lock().unwrap() = Some(error);
    }

    pub fn fail_next_crd_get(&self, error: ClusterError) {
        *self.get_crd_error.lock().unwrap() = Some(error);
    }

    pub fn has_crd(&self, name: &str) -> bool {
        self.crds.lock().unwrap().contains_key(name)
    }

    pub fn insert_crd(&self, crd: CustomResourceDefinition) {
        let name = crd.metadata.name.clone().unwrap_or_default();
        self.crds.lock().unwrap().insert(name, crd);
    }

    pub fn watch_calls(&self) -> usize {
        self.watched_namespaces.lock().unwrap().len()
    }

    pub fn watched_namespaces(&self) -> Vec<Option<String>> {
        self.watched_namespaces.lock().unwrap().clone()
    }

    fn apply_patch(
        &self,
        name: &str,
        namespace: Option<&str>,
        patch: &Value,
    ) -> Result<Value, ClusterError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(namespace.map(str::to_string), name.to_string()))
            .ok_or_else(|| ClusterError::api(404, "NotFound", &format!("{} not found", name)))?;

        merge_patch(object, patch);
        let version = self.resource_version.fetch_add(1, Ordering::SeqCst) + 2;
        object["metadata"]["resourceVersion"] = json!(version.to_string());
        Ok(object.clone())
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn watch(
        &self,
        _kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<WatchStream, ClusterError> {
        self.watched_namespaces
            .lock()
            .unwrap()
            .push(namespace.map(str::to_string));

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(WatchScript::Events(events)) => Ok(stream::iter(events).boxed()),
            Some(WatchScript::ReplayAdded) => {
                let events: Vec<_> = self
                    .objects
                    .lock()
                    .unwrap()
                    .values()
                    .map(|o| event(EventType::Added, o.clone()))
                    .collect();
                Ok(stream::iter(events).boxed())
            }
            Some(WatchScript::FailToOpen(error)) => Err(error),
            None => {
                if let Some(trigger) = self.stop_when_exhausted.lock().unwrap().as_ref() {
                    trigger.trigger();
                }
                Ok(stream::pending::<Result<WatchEvent, ClusterError>>().boxed())
            }
        }
    }

    async fn get_object(
        &self,
        _kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Value>, ClusterError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.object(name, namespace))
    }

    async fn patch_object(
        &self,
        _kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &Value,
    ) -> Result<Value, ClusterError> {
        self.object_patches.fetch_add(1, Ordering::SeqCst);
        self.apply_patch(name, namespace, patch)
    }

    async fn patch_status(
        &self,
        _kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &Value,
    ) -> Result<Value, ClusterError> {
        self.status_patches.fetch_add(1, Ordering::SeqCst);
        // the status subresource ignores everything but status
        let status = patch.get("status").cloned().unwrap_or(Value::Null);
        let status_only = json!({ "status": status });
        self.apply_patch(name, namespace, &status_only)
    }

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>, ClusterError> {
        if let Some(error) = self.get_crd_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.crds.lock().unwrap().get(name).cloned())
    }

    async fn create_crd(&self, crd: &CustomResourceDefinition) -> Result<(), ClusterError> {
        self.crd_creates.fetch_add(1, Ordering::SeqCst);
        self.insert_crd(crd.clone());
        match self.create_crd_error.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Handler call counters shared between a factory and the handlers it builds
#[derive(Default)]
pub struct Calls {
    pub create: AtomicUsize,
    pub modify: AtomicUsize,
    pub delete: AtomicUsize,
    pub names: Mutex<Vec<String>>,
}

impl Calls {
    pub fn create(&self) -> usize {
        self.create.load(Ordering::SeqCst)
    }

    pub fn modify(&self) -> usize {
        self.modify.load(Ordering::SeqCst)
    }

    pub fn delete(&self) -> usize {
        self.delete.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.create() + self.modify() + self.delete()
    }

    /// `ACTION name` for every handler call, in order
    pub fn log(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct RecordingFactory {
    calls: Arc<Calls>,
    fail_create: Option<String>,
    fail_modify: Option<String>,
    fail_delete: Option<String>,
    reject: Option<String>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Arc<Calls> {
        self.calls.clone()
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.fail_create = Some(message.to_string());
        self
    }

    pub fn failing_modify(mut self, message: &str) -> Self {
        self.fail_modify = Some(message.to_string());
        self
    }

    pub fn failing_delete(mut self, message: &str) -> Self {
        self.fail_delete = Some(message.to_string());
        self
    }

    /// Reject every resource at construction time
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject = Some(message.to_string());
        self
    }
}

impl HandlerFactory for RecordingFactory {
    type Handler = RecordingHandler;

    fn build(
        &self,
        _resource: &CustomResource,
        _api: Arc<dyn ClusterApi>,
    ) -> anyhow::Result<RecordingHandler> {
        if let Some(message) = &self.reject {
            anyhow::bail!("{}", message);
        }
        Ok(RecordingHandler {
            factory: self.clone(),
        })
    }
}

pub struct RecordingHandler {
    factory: RecordingFactory,
}

impl RecordingHandler {
    fn record(&self, counter: &AtomicUsize, action: &str, resource: &StatusStore) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.factory
            .calls
            .names
            .lock()
            .unwrap()
            .push(format!("{} {}", action, resource.resource().name()));
    }

    fn outcome(failure: &Option<String>) -> anyhow::Result<()> {
        match failure {
            Some(message) => Err(anyhow::Error::msg(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceHandler for RecordingHandler {
    async fn create(&mut self, resource: &mut StatusStore) -> anyhow::Result<()> {
        self.record(&self.factory.calls.create, "create", resource);
        Self::outcome(&self.factory.fail_create)
    }

    async fn modify(&mut self, resource: &mut StatusStore) -> anyhow::Result<()> {
        self.record(&self.factory.calls.modify, "modify", resource);
        Self::outcome(&self.factory.fail_modify)
    }

    async fn delete(&mut self, resource: &mut StatusStore) -> anyhow::Result<()> {
        self.record(&self.factory.calls.delete, "delete", resource);
        Self::outcome(&self.factory.fail_delete)
    }
}
