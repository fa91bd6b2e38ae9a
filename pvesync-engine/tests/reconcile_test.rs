//! End-to-end reconciliation tests.
//!
//! These drive the full build, plan and execute pipeline against the
//! in-memory hypervisor and inventory backends.

use pvesync_engine::{reconcile, AssumeNo, AssumeYes, PinMode, PinPolicy, SyncError, SyncOptions};
use pvesync_hypervisor::{ClusterStatusEntry, GuestInterface, MockBackend, VmConfig, VmListItem};
use pvesync_inventory::{EntityKind, MockInventory, NewEntity, NewVirtualMachine};
use std::sync::Arc;

fn vm_config(disk: &str, mac: &str) -> VmConfig {
    VmConfig::from_entries([
        ("agent", "1".to_string()),
        ("memory", "4096".to_string()),
        ("sockets", "1".to_string()),
        ("cores", "2".to_string()),
        ("scsi0", format!("local:vm-100-disk-0,size={}", disk)),
        ("net0", format!("virtio={},bridge=vmbr0", mac)),
    ])
}

/// One node, one VM, one NIC reported by the guest agent.
fn single_vm_backend() -> MockBackend {
    MockBackend::new()
        .with_node("pve01", "online")
        .with_vm("pve01", VmListItem::new(100, "web01", "running"), vm_config("32G", "AA:BB:CC:DD:EE:FF"))
        .with_guest_network(
            "pve01",
            100,
            vec![GuestInterface::new("eth0", "aa:bb:cc:dd:ee:ff").with_ip("10.0.0.5", "ipv4", 24)],
        )
}

fn clustered_backend() -> MockBackend {
    single_vm_backend().with_cluster_status(vec![
        ClusterStatusEntry::cluster("lab", 1),
        ClusterStatusEntry::node("pve01", true),
    ])
}

fn created_vms(target: &MockInventory) -> Vec<NewVirtualMachine> {
    target
        .created()
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            NewEntity::VirtualMachine(vm) => Some(vm),
            _ => None,
        })
        .collect()
}

/// Test the documented single-VM example from discovery to inventory.
#[tokio::test]
async fn test_single_vm_end_to_end() {
    let source = Arc::new(single_vm_backend());
    let target = MockInventory::new();
    
    let outcome = reconcile(source, &target, &AssumeNo, &SyncOptions::new(PinPolicy::Unpinned))
        .await
        .unwrap();
    
    let vm = outcome.tree.vms().next().unwrap();
    assert_eq!(vm.name, "web01");
    assert_eq!(vm.vcpus, 2);
    assert_eq!(vm.memory_mb, 4096);
    assert_eq!(vm.disks.len(), 1);
    assert_eq!(vm.disks[0].slot_key, "scsi0");
    assert_eq!(vm.disks[0].size_mb, 32768);
    assert_eq!(vm.nics[0].mac, "aa:bb:cc:dd:ee:ff");
    assert_eq!(vm.nics[0].guest_name.as_deref(), Some("eth0"));
    assert_eq!(vm.nics[0].ip_addresses[0].address, "10.0.0.5/24");
    
    assert_eq!(
        target.created_kinds().unwrap(),
        vec![
            EntityKind::VirtualMachine,
            EntityKind::MacAddress,
            EntityKind::Interface,
            EntityKind::IpAddress,
            EntityKind::VirtualDisk,
        ]
    );
    assert_eq!(outcome.context.summary.total_created(), 5);
    assert_eq!(outcome.context.summary.total_dropped(), 0);
    assert!(outcome.context.finished_at.is_some());
}

/// Test that a second run against the same snapshot creates nothing.
#[tokio::test]
async fn test_second_run_is_idempotent() {
    let source: Arc<MockBackend> = Arc::new(clustered_backend());
    let target = MockInventory::new();
    let options = SyncOptions::new(PinPolicy::from_mode(PinMode::Cluster));
    
    reconcile(source.clone(), &target, &AssumeYes, &options).await.unwrap();
    let first = target.created().unwrap().len();
    
    let outcome = reconcile(source, &target, &AssumeYes, &options).await.unwrap();
    let summary = &outcome.context.summary;
    
    assert_eq!(target.created().unwrap().len(), first);
    assert_eq!(summary.total_created(), 0);
    assert_eq!(summary.get(EntityKind::ClusterType).skipped, 1);
    assert_eq!(summary.get(EntityKind::Cluster).skipped, 1);
    assert_eq!(summary.get(EntityKind::VirtualMachine).skipped, 1);
    assert_eq!(summary.get(EntityKind::VirtualDisk).skipped, 1);
}

/// Test that each pin mode sets exactly its own placement key.
#[tokio::test]
async fn test_pin_modes_are_exclusive() {
    // node
    let target = MockInventory::new();
    let device = target.seed(EntityKind::Device, "pve01").unwrap();
    reconcile(Arc::new(single_vm_backend()), &target, &AssumeNo, &SyncOptions::new(PinPolicy::Node))
        .await
        .unwrap();
    let vms = created_vms(&target);
    let vm = &vms[0];
    assert_eq!((vm.device, vm.cluster), (Some(device), None));
    
    // cluster
    let target = MockInventory::new();
    let options = SyncOptions::new(PinPolicy::from_mode(PinMode::Cluster));
    let outcome = reconcile(Arc::new(clustered_backend()), &target, &AssumeYes, &options)
        .await
        .unwrap();
    let cluster_id = outcome.tree.cluster.as_ref().and_then(|c| c.target_id.get());
    let vms = created_vms(&target);
    let vm = &vms[0];
    assert!(cluster_id.is_some());
    assert_eq!((vm.device, vm.cluster), (None, cluster_id));
    
    // neither
    let target = MockInventory::new();
    reconcile(Arc::new(single_vm_backend()), &target, &AssumeNo, &SyncOptions::new(PinPolicy::Unpinned))
        .await
        .unwrap();
    let vms = created_vms(&target);
    let vm = &vms[0];
    assert_eq!((vm.device, vm.cluster), (None, None));
}

/// Test that a failed VM create leaves its neighbours untouched.
#[tokio::test]
async fn test_failed_vm_is_isolated() {
    let source = Arc::new(
        MockBackend::new()
            .with_node("pve01", "online")
            .with_vm("pve01", VmListItem::new(100, "first", "running"), vm_config("8G", "02:00:00:00:00:01"))
            .with_vm("pve01", VmListItem::new(101, "second", "running"), vm_config("8G", "02:00:00:00:00:02"))
            .with_vm("pve01", VmListItem::new(102, "third", "stopped"), vm_config("8G", "02:00:00:00:00:03")),
    );
    let target = MockInventory::new();
    target.fail_create(EntityKind::VirtualMachine, "second").unwrap();
    
    let outcome = reconcile(source, &target, &AssumeNo, &SyncOptions::new(PinPolicy::Unpinned))
        .await
        .unwrap();
    
    let names: Vec<String> = created_vms(&target).into_iter().map(|vm| vm.name).collect();
    assert_eq!(names, vec!["first".to_string(), "third".to_string()]);
    assert_eq!(target.created_count(EntityKind::VirtualDisk).unwrap(), 2);
    assert_eq!(target.created_count(EntityKind::Interface).unwrap(), 2);
    
    let records = target.records().unwrap();
    assert!(!records.iter().any(|r| r.key == "02:00:00:00:00:02"));
    
    let summary = &outcome.context.summary;
    assert_eq!(summary.get(EntityKind::VirtualMachine).dropped, 1);
    assert_eq!(summary.get(EntityKind::VirtualDisk).dropped, 1);
}

/// Test that the same VM name on two nodes is ingested only once.
#[tokio::test]
async fn test_same_name_on_two_nodes_is_created_once() {
    let source = Arc::new(
        MockBackend::new()
            .with_node("pve01", "online")
            .with_node("pve02", "online")
            .with_vm("pve01", VmListItem::new(100, "web", "running"), VmConfig::from_entries([("memory", "1024")]))
            .with_vm("pve02", VmListItem::new(200, "web", "stopped"), VmConfig::from_entries([("memory", "2048")])),
    );
    let target = MockInventory::new();
    
    let outcome = reconcile(source, &target, &AssumeNo, &SyncOptions::new(PinPolicy::Unpinned))
        .await
        .unwrap();
    
    let vms = created_vms(&target);
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].memory, 1024);
    
    let counts = outcome.context.summary.get(EntityKind::VirtualMachine);
    assert_eq!((counts.created, counts.skipped, counts.dropped), (1, 1, 0));
}

/// Test that node pinning fails before any write when a node has no device.
#[tokio::test]
async fn test_unmatched_node_aborts_run() {
    let source = Arc::new(
        single_vm_backend()
            .with_node("pve02", "online")
            .with_node("pve03", "offline"),
    );
    let target = MockInventory::new();
    target.seed(EntityKind::Device, "pve02").unwrap();
    
    let err = reconcile(source, &target, &AssumeYes, &SyncOptions::new(PinPolicy::Node))
        .await
        .unwrap_err();
    
    match err {
        SyncError::Validation { unmatched, .. } => {
            assert_eq!(unmatched, vec!["pve01".to_string(), "pve03".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(target.created().unwrap().is_empty());
}

/// Test that declining cluster creation aborts before VM processing.
#[tokio::test]
async fn test_declined_cluster_aborts_run() {
    let target = MockInventory::new();
    target.seed(EntityKind::ClusterType, "proxmox").unwrap();
    let options = SyncOptions::new(PinPolicy::from_mode(PinMode::Cluster));
    
    let err = reconcile(Arc::new(clustered_backend()), &target, &AssumeNo, &options)
        .await
        .unwrap_err();
    
    assert!(err.is_fatal());
    assert!(matches!(err, SyncError::PolicyDecline { kind: EntityKind::Cluster, .. }));
    assert!(target.created().unwrap().is_empty());
}

/// Test that a dry run plans but never writes.
#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let target = MockInventory::new();
    let mut options = SyncOptions::new(PinPolicy::Unpinned);
    options.dry_run = true;
    
    let outcome = reconcile(Arc::new(single_vm_backend()), &target, &AssumeYes, &options)
        .await
        .unwrap();
    
    assert_eq!(outcome.plan.vms_to_create(), 1);
    assert!(target.created().unwrap().is_empty());
}
