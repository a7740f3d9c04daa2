//! Gateway surface: resolution, sockets, logging, and loop exit.

use simcell::{
    HostError, LogLevel, ModuleDef, NodeConfig, NodeId, PluginCtx, Request, SimHost, SocketId,
    TimerId,
};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::time::Duration;

thread_local! {
    static FIRED: RefCell<Vec<&'static str>> = RefCell::new(Vec::new());
}

fn take_fired() -> Vec<&'static str> {
    FIRED.with(|fired| std::mem::take(&mut *fired.borrow_mut()))
}

fn node_config(hostname: &str, last_octet: u8) -> NodeConfig {
    NodeConfig {
        hostname: hostname.to_string(),
        addr: Ipv4Addr::new(10, 0, 0, last_octet),
        upload_kbps: 300,
        download_kbps: 700,
    }
}

fn no_globals(_ctx: &mut PluginCtx<'_>) {}

fn idle_node_init(_ctx: &mut PluginCtx<'_>) {}

fn resolver_node_init(ctx: &mut PluginCtx<'_>) {
    let mut buf = [0u8; 64];
    let len = ctx.gethostname(&mut buf).expect("own hostname");
    if &buf[..len] != b"alpha" {
        return;
    }

    assert_eq!(ctx.getip().expect("own address"), Ipv4Addr::new(10, 0, 0, 1));

    // The peer was spawned earlier, so its record is already resolvable.
    let peer = ctx.resolve_name("beta").expect("resolve peer");
    assert_eq!(peer, Ipv4Addr::new(10, 0, 0, 2));

    let len = ctx.resolve_addr(peer, &mut buf).expect("reverse lookup");
    assert_eq!(&buf[..len], b"beta");

    // Bandwidth is the lesser of the peer's configured directions.
    assert_eq!(ctx.resolve_min_bandwidth(peer).expect("bandwidth"), 300);
    // Unmapped addresses resolve to zero bandwidth, never an error.
    assert_eq!(
        ctx.resolve_min_bandwidth(Ipv4Addr::new(192, 168, 1, 1))
            .expect("unmapped bandwidth"),
        0
    );

    let missing = ctx.resolve_name("gamma").expect_err("unknown name");
    assert_eq!(missing, HostError::UnknownHostname("gamma".to_string()));

    // A buffer shorter than the hostname is a capacity error, reported
    // differently from a name that does not exist at all.
    let mut tiny = [0u8; 2];
    let cramped = ctx
        .resolve_addr(peer, &mut tiny)
        .expect_err("buffer too small");
    assert!(matches!(cramped, HostError::BufferTooSmall { .. }));
    let unknown = ctx
        .resolve_addr(Ipv4Addr::new(192, 168, 1, 1), &mut buf)
        .expect_err("unknown address");
    assert!(matches!(unknown, HostError::UnknownAddress(_)));

    FIRED.with(|fired| fired.borrow_mut().push("resolved"));
}

#[test]
fn resolution_covers_names_addresses_and_bandwidth() {
    take_fired();

    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: resolver_node_init,
    });
    host.spawn_node(module, node_config("beta", 2))
        .expect("spawn beta");
    host.spawn_node(module, node_config("alpha", 1))
        .expect("spawn alpha");

    assert_eq!(take_fired(), vec!["resolved"]);
}

#[test]
fn duplicate_hostnames_are_rejected() {
    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: idle_node_init,
    });
    host.spawn_node(module, node_config("alpha", 1))
        .expect("spawn alpha");

    let clash = host
        .spawn_node(module, node_config("alpha", 9))
        .expect_err("duplicate hostname");
    assert_eq!(clash, HostError::DuplicateHostname("alpha".to_string()));
}

fn socket_node_init(ctx: &mut PluginCtx<'_>) {
    ctx.timer_create(Duration::from_millis(5), poll_before, 0)
        .expect("early poll");
    ctx.timer_create(Duration::from_millis(20), poll_after, 0)
        .expect("late poll");
}

fn poll_before(ctx: &mut PluginCtx<'_>, _timer: TimerId, _arg: u64) {
    // The readiness event is scheduled for 10ms; nothing is ready yet.
    assert!(!ctx.socket_is_readable(SocketId(1)).expect("readable"));
    assert!(!ctx.socket_is_writable(SocketId(1)).expect("writable"));
    FIRED.with(|fired| fired.borrow_mut().push("before"));
}

fn poll_after(ctx: &mut PluginCtx<'_>, _timer: TimerId, _arg: u64) {
    assert!(ctx.socket_is_readable(SocketId(1)).expect("readable"));
    assert!(ctx.socket_is_writable(SocketId(1)).expect("writable"));

    let bad = ctx
        .socket_is_readable(SocketId(9))
        .expect_err("unknown descriptor");
    assert!(matches!(bad, HostError::UnknownSocket(_)));
    FIRED.with(|fired| fired.borrow_mut().push("after"));
}

#[test]
fn socket_readiness_follows_scheduled_status_events() {
    take_fired();

    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: socket_node_init,
    });
    let node = host
        .spawn_node(module, node_config("alpha", 1))
        .expect("spawn");

    let socket = host.open_socket(node, 80).expect("open socket");
    assert_eq!(socket, SocketId(1));
    host.schedule_socket_status(node, socket, true, true, Duration::from_millis(10));

    host.run_until_empty();
    assert_eq!(take_fired(), vec!["before", "after"]);
}

#[test]
fn readiness_events_for_closed_sockets_are_stale() {
    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: idle_node_init,
    });
    let node = host
        .spawn_node(module, node_config("alpha", 1))
        .expect("spawn");

    let socket = host.open_socket(node, 80).expect("open socket");
    host.schedule_socket_status(node, socket, true, false, Duration::from_millis(10));
    assert!(host.close_socket(node, socket).expect("close"));

    // The stale event is consumed without error.
    host.run_until_empty();
    assert_eq!(host.current_time(), Duration::from_millis(10));
}

fn loopexit_node_init(ctx: &mut PluginCtx<'_>) {
    ctx.set_loopexit(on_loopexit).expect("set loopexit");
    // Scheduled past the shutdown; must never fire.
    ctx.timer_create(Duration::from_millis(100), never_fires, 0)
        .expect("timer");
}

fn on_loopexit(ctx: &mut PluginCtx<'_>, timer: TimerId, arg: u64) {
    // Loop-exit invocations carry the null timer id, not a real timer.
    assert_eq!(timer, TimerId::NONE);
    assert_eq!(arg, 0);
    let mut buf = [0u8; 64];
    let len = ctx.gethostname(&mut buf).expect("hostname");
    let marker = if &buf[..len] == b"alpha" { "alpha" } else { "beta" };
    FIRED.with(|fired| fired.borrow_mut().push(marker));
}

fn never_fires(_ctx: &mut PluginCtx<'_>, _timer: TimerId, _arg: u64) {
    FIRED.with(|fired| fired.borrow_mut().push("late timer"));
}

#[test]
fn scheduled_shutdown_fires_loopexit_and_stops_the_loop() {
    take_fired();

    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: loopexit_node_init,
    });
    host.spawn_node(module, node_config("alpha", 1))
        .expect("spawn alpha");
    host.spawn_node(module, node_config("beta", 2))
        .expect("spawn beta");

    host.schedule_shutdown(Duration::from_millis(50));
    host.run_until_empty();

    // Every live node saw the loop-exit callback, in creation order; the
    // 100ms timers were never reached.
    assert_eq!(take_fired(), vec!["alpha", "beta"]);
    assert_eq!(host.current_time(), Duration::from_millis(50));
    assert!(host.is_shutdown_requested());
}

#[test]
fn immediate_shutdown_fires_loopexit_once() {
    take_fired();

    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: loopexit_node_init,
    });
    host.spawn_node(module, node_config("alpha", 1))
        .expect("spawn");

    host.request_shutdown();
    host.request_shutdown();
    host.run_until_empty();

    assert_eq!(take_fired(), vec!["alpha"]);
    assert_eq!(host.current_time(), Duration::ZERO);
}

#[test]
fn dispatch_requires_the_calling_node_to_be_active() {
    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: idle_node_init,
    });
    let node = host
        .spawn_node(module, node_config("alpha", 1))
        .expect("spawn");

    // Between events no node is switched in, so the gateway refuses.
    let refused = host
        .dispatch(node, Request::GetTime)
        .expect_err("inactive dispatch");
    assert_eq!(refused, HostError::NotActive { requested: node });
    assert_eq!(host.active_node(), None);
}

#[test]
fn node_configs_load_from_json() {
    let raw = r#"[
        {"hostname": "alpha", "addr": "10.0.0.1", "upload_kbps": 500, "download_kbps": 800},
        {"hostname": "beta", "addr": "10.0.0.2", "upload_kbps": 300, "download_kbps": 700}
    ]"#;
    let configs: Vec<NodeConfig> = serde_json::from_str(raw).expect("parse configs");

    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: idle_node_init,
    });
    let nodes: Vec<NodeId> = configs
        .into_iter()
        .map(|config| host.spawn_node(module, config).expect("spawn"))
        .collect();

    assert_eq!(nodes.len(), 2);
    assert_eq!(host.directory().len(), 2);
    assert_eq!(
        host.directory().resolve_name("alpha").expect("alpha"),
        Ipv4Addr::new(10, 0, 0, 1)
    );
    assert_eq!(
        host.directory().min_bandwidth(Ipv4Addr::new(10, 0, 0, 2)),
        300
    );
}

fn logging_node_init(ctx: &mut PluginCtx<'_>) {
    ctx.log(LogLevel::Info, "node came up").expect("log");
    ctx.log(LogLevel::Debug, "verbose detail").expect("log");
    ctx.log_binary(LogLevel::Trace, &[0xde, 0xad, 0xbe, 0xef])
        .expect("log binary");
    // Previews are bounded, so large payloads are fine too.
    ctx.log_binary(LogLevel::Debug, &[0u8; 256]).expect("log binary");
}

#[test]
fn log_requests_are_accepted_at_every_level() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("trace")
        .with_test_writer()
        .try_init();

    let mut host = SimHost::new();
    let module = host.load_module(ModuleDef {
        module_init: no_globals,
        node_init: logging_node_init,
    });
    host.spawn_node(module, node_config("alpha", 1))
        .expect("spawn");
}
