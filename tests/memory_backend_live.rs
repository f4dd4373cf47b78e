//! In-Memory Backend Integration Tests
//!
//! Bindings, non-blocking writes and the diagnostics listener running
//! together against `MemoryBackend` with access policies.

use std::sync::Arc;

use livedoc::store::{
    into_fields, AccessPolicy, CollectionPath, DocumentPath, FilterOp, MemoryBackend, Query,
    SortDirection,
};
use livedoc::{
    CollectionBinding, DiagnosticsListener, DocumentBinding, Identity, Operation,
    ServiceContext, Writes, PERMISSION_ERROR,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Customer {
    owner_id: String,
    name: String,
}

fn owned_customers() -> MemoryBackend {
    MemoryBackend::new().with_policy(
        "customers",
        AccessPolicy::Ownership {
            owner_field: "ownerId".to_string(),
        },
    )
}

fn context(backend: &MemoryBackend, uid: Option<&str>) -> Arc<ServiceContext> {
    let mut builder = ServiceContext::builder().backend(Arc::new(backend.clone()));
    if let Some(uid) = uid {
        builder = builder.identity(Identity::new(uid));
    }
    builder.mounted().build()
}

fn customers() -> CollectionPath {
    CollectionPath::parse("orgs/org1/customers").unwrap()
}

#[test]
fn test_writes_flow_to_live_query() {
    let backend = owned_customers();
    let ctx = context(&backend, Some("u1"));
    let writes = Writes::new(Arc::clone(&ctx));

    let binding = CollectionBinding::<Customer>::new(Arc::clone(&ctx));
    binding.watch(Some(
        Query::new(customers())
            .filter("ownerId", FilterOp::Eq, json!("u1"))
            .order_by("name", SortDirection::Asc),
    ));
    assert_eq!(binding.current().data().map(Vec::len), Some(0));

    writes.add_document(&customers(), &json!({"ownerId": "u1", "name": "Zed"}));
    writes.add_document(&customers(), &json!({"ownerId": "u1", "name": "Acme"}));

    let names: Vec<String> = binding
        .current()
        .into_data()
        .unwrap()
        .into_iter()
        .map(|c| c.data.name)
        .collect();
    assert_eq!(names, vec!["Acme", "Zed"]);
}

#[test]
fn test_foreign_document_denied_and_diagnosed() {
    let backend = owned_customers();
    let path = customers().doc("c1").unwrap();
    backend.seed(&path, into_fields(json!({"ownerId": "u2", "name": "Other"})));

    let ctx = context(&backend, Some("u1"));
    let diagnostics = DiagnosticsListener::attach(ctx.emitter(), 16);

    let binding = DocumentBinding::<Customer>::new(Arc::clone(&ctx));
    binding.watch(Some(path.clone()));

    let state = binding.current();
    let err = state.error().and_then(|e| e.as_permission()).unwrap();
    assert_eq!(err.operation, Operation::Get);
    assert_eq!(err.resource_path, "orgs/org1/customers/c1");
    assert_eq!(err.auth.as_ref().map(|a| a.uid.as_str()), Some("u1"));

    let records = diagnostics.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event_type, PERMISSION_ERROR);
    assert_eq!(ctx.metrics().snapshot().permission_denials, 1);
}

#[test]
fn test_listener_detached_after_access_revoked() {
    let backend = owned_customers();
    let path = customers().doc("c1").unwrap();
    backend.seed(&path, into_fields(json!({"ownerId": "u1", "name": "Mine"})));

    let ctx = context(&backend, Some("u1"));
    let binding = DocumentBinding::<Customer>::new(Arc::clone(&ctx));
    binding.watch(Some(path.clone()));
    assert_eq!(binding.current().data().unwrap().name, "Mine");

    // Ownership moves away; the listener is denied and removed
    backend.seed(&path, into_fields(json!({"ownerId": "u2", "name": "Theirs"})));
    assert!(binding.current().error().is_some());
    assert_eq!(backend.listener_count(), 0);

    // Later writes do not reach the binding
    backend.seed(&path, into_fields(json!({"ownerId": "u1", "name": "Back"})));
    assert!(binding.current().error().is_some());
}

#[test]
fn test_denied_write_reaches_diagnostics_with_request_data() {
    let backend = owned_customers();
    let ctx = context(&backend, Some("u1"));
    let diagnostics = DiagnosticsListener::attach(ctx.emitter(), 16);
    let writes = Writes::new(Arc::clone(&ctx));

    let path = customers().doc("c9").unwrap();
    writes.set_document(&path, &json!({"ownerId": "u2", "name": "Spoof"}), false);

    assert!(backend.get(&path).is_none());
    let records = diagnostics.records();
    let err = records[0].error.as_permission().unwrap();
    assert_eq!(err.operation, Operation::Write);
    assert_eq!(
        err.request_resource_data,
        Some(json!({"ownerId": "u2", "name": "Spoof"}))
    );
}

#[test]
fn test_identity_change_applies_on_refresh() {
    let backend = MemoryBackend::new().with_policy("profiles", AccessPolicy::Authenticated);
    let path = DocumentPath::parse("profiles/p1").unwrap();
    backend.seed(&path, into_fields(json!({"bio": "hi"})));

    let ctx = context(&backend, None);
    let binding = DocumentBinding::<Value>::new(Arc::clone(&ctx));
    binding.watch(Some(path.clone()));
    assert!(binding.current().error().is_some());

    ctx.set_identity(Some(Identity::new("u1")));
    binding.watch(Some(path.clone()));
    assert!(binding.current().error().is_some());

    binding.refresh();
    assert_eq!(binding.current().data().unwrap()["bio"], "hi");
}

#[test]
fn test_unmount_then_watch_settles_idle() {
    let backend = MemoryBackend::new();
    let path = DocumentPath::parse("users/u1").unwrap();
    backend.seed(&path, into_fields(json!({"a": 1})));

    let ctx = context(&backend, None);
    let binding = DocumentBinding::<Value>::new(Arc::clone(&ctx));
    binding.watch(Some(path.clone()));
    assert!(binding.current().data().is_some());
    assert_eq!(backend.listener_count(), 1);

    ctx.unmount();
    binding.refresh();
    assert!(binding.current().is_idle());
    assert_eq!(backend.listener_count(), 0);
    assert_eq!(ctx.metrics().active_listeners(), 0);
}

#[test]
fn test_unmount_releases_live_bindings_without_refresh() {
    let backend = MemoryBackend::new();
    let path = DocumentPath::parse("users/u1").unwrap();
    backend.seed(&path, into_fields(json!({"a": 1})));
    backend.seed(&DocumentPath::parse("users/u2").unwrap(), into_fields(json!({"a": 1})));

    let ctx = context(&backend, None);
    let document = DocumentBinding::<Value>::new(Arc::clone(&ctx));
    let collection = CollectionBinding::<Value>::new(Arc::clone(&ctx));
    document.watch(Some(path.clone()));
    collection.watch(Some(Query::new(CollectionPath::parse("users").unwrap())));
    assert_eq!(backend.listener_count(), 2);

    ctx.unmount();
    assert!(!ctx.are_services_available());
    assert_eq!(backend.listener_count(), 0);
    assert_eq!(ctx.metrics().active_listeners(), 0);

    backend.seed(&path, into_fields(json!({"a": 2})));
    assert!(document.current().is_idle());
    assert!(collection.current().is_idle());

    ctx.mount();
    document.refresh();
    collection.refresh();
    assert_eq!(document.current().data().unwrap()["a"], 2);
    assert_eq!(collection.current().data().unwrap().len(), 2);
    assert_eq!(backend.listener_count(), 2);
}
