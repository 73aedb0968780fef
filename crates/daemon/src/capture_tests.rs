// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn role_tags() {
    assert_eq!(Role::Main.tag(), "main");
    assert_eq!(Role::Wsgi.tag(), "wid");
    assert_eq!(Role::Tcp.tag(), "tid");
    assert_eq!(Role::Udp.tag(), "uid");
    assert_eq!(Role::Daemon.tag(), "did");
}

#[test]
fn role_label_is_zero_padded() {
    set_worker_role(Role::Wsgi, 3);
    assert_eq!(role_label(), "wid:003");
    set_worker_role(Role::Daemon, 12);
    assert_eq!(role_label(), "did:012");
    set_worker_role(Role::Main, 0);
    assert_eq!(role_label(), "main:000");
}

#[test]
fn role_is_thread_local() {
    set_worker_role(Role::Tcp, 1);
    let handle = std::thread::spawn(|| {
        // New threads start as main until tagged.
        assert_eq!(current_role(), (Role::Main, 0));
        set_worker_role(Role::Udp, 0);
        assert_eq!(role_label(), "uid:000");
    });
    handle.join().unwrap();
    assert_eq!(current_role(), (Role::Tcp, 1));
}
