use crate::net::NodeAddr;
use crate::proto::{ConnKey, ConnTable, Endpoint, Keyed, TransportError};

#[derive(Debug)]
struct Entry(ConnKey);

impl Keyed for Entry {
    fn key(&self) -> ConnKey {
        self.0
    }
}

fn key(local: u16, addr: u16, port: u16) -> ConnKey {
    ConnKey::new(local, Endpoint::new(NodeAddr(addr), port))
}

#[test]
fn duplicate_key_is_rejected() {
    let mut t = ConnTable::new(4);
    t.insert(Entry(key(10, 2, 20))).expect("first");
    assert_eq!(
        t.insert(Entry(key(10, 2, 20))).unwrap_err(),
        TransportError::ConnectionExists(key(10, 2, 20))
    );
    // 只差对端端口就是另一条连接
    t.insert(Entry(key(10, 2, 21))).expect("different remote port");
    assert_eq!(t.len(), 2);
}

#[test]
fn full_table_reports_capacity() {
    let mut t = ConnTable::new(2);
    t.insert(Entry(key(1, 2, 1))).expect("1");
    t.insert(Entry(key(2, 2, 1))).expect("2");
    assert_eq!(
        t.insert(Entry(key(3, 2, 1))).unwrap_err(),
        TransportError::TableFull { capacity: 2 }
    );
}

#[test]
fn freed_slot_is_reused_and_old_handle_goes_stale() {
    let mut t = ConnTable::new(1);
    let old = t.insert(Entry(key(1, 2, 3))).expect("insert");
    assert!(t.remove(old).is_some());
    assert!(t.is_empty());

    let new = t.insert(Entry(key(4, 5, 6))).expect("reuse");
    assert_eq!(new.slot, old.slot);
    assert_ne!(new.generation, old.generation);
    assert!(t.get(old).is_none());
    assert!(t.get_mut(old).is_none());
    assert!(t.remove(old).is_none());
    assert_eq!(t.get(new).map(Keyed::key), Some(key(4, 5, 6)));
}

#[test]
fn listener_lookup_is_separate_from_exact_match() {
    let mut t = ConnTable::new(4);
    let l = t.insert(Entry(ConnKey::listener(123))).expect("listener");
    let c = t.insert(Entry(key(123, 7, 200))).expect("conn");
    assert_eq!(t.find_listener(123), Some(l));
    assert_eq!(t.find(&key(123, 7, 200)), Some(c));
    assert_eq!(t.find(&key(123, 7, 201)), None);
    assert_eq!(t.find_listener(124), None);
    assert!(ConnKey::listener(123).is_listener());
    assert_eq!(ConnKey::listener(123).to_string(), ":123 <-> *:*");

    let handles = t.handles();
    assert_eq!(handles, vec![l, c]);
    assert_eq!(t.iter().count(), 2);
}
