use std::{thread, time};

use super::*;

fn body(text: &str) -> Encoded {
    let mut buf = Encoded::new("test");
    buf.write_str(text);
    buf
}

#[test]
fn test_tag_wire() {
    assert_eq!(TAGS.len(), 41);
    for (off, tag) in TAGS.iter().enumerate() {
        assert_eq!(tag.to_wire() as usize, off);
        assert_eq!(Tag::from_wire(off as u8).unwrap(), *tag);
    }
    assert!(Tag::from_wire(41).is_err());
}

#[test]
fn test_comm_send_poll() {
    let mut mesh = full_mesh(3);
    let c2 = mesh.remove(2);
    let c1 = mesh.remove(1);
    let mut c0 = mesh.remove(0);

    assert_eq!(c0.rank(), 0);
    assert_eq!(c1.rank(), 1);
    assert_eq!(c2.rank(), 2);
    assert_eq!(c0.size(), 3);

    assert!(c0.poll().is_none());

    c1.send(0, Tag::WorkerStatus, body("one")).unwrap();
    c2.send(0, Tag::WorkerStatus, body("two")).unwrap();

    let mut msg = c0.poll().unwrap();
    assert_eq!(msg.from, 1);
    assert_eq!(msg.tag, Tag::WorkerStatus);
    assert_eq!(msg.body.read_str().unwrap(), "one");

    let msg = c0.poll().unwrap();
    assert_eq!(msg.from, 2);
    assert!(c0.poll().is_none());

    // Out of mesh.
    assert!(c0.send(9, Tag::WorkerStatus, body("nope")).is_err());
}

#[test]
fn test_comm_wait_tag_stash() {
    let mut mesh = full_mesh(2);
    let c1 = mesh.remove(1);
    let mut c0 = mesh.remove(0);

    c1.send(0, Tag::WorkerStatus, body("a")).unwrap();
    c1.send(0, Tag::IncumbentTwo, body("b")).unwrap();
    c1.send(0, Tag::ContOrTerm, body("c")).unwrap();

    // Tag-selective wait skips and stashes the earlier arrivals.
    let mut msg = c0.wait_tag(Tag::ContOrTerm, Some(1)).unwrap();
    assert_eq!(msg.body.read_str().unwrap(), "c");

    // Stashed messages drain in their original order.
    let mut msg = c0.poll().unwrap();
    assert_eq!(msg.tag, Tag::WorkerStatus);
    assert_eq!(msg.body.read_str().unwrap(), "a");
    let msg = c0.poll().unwrap();
    assert_eq!(msg.tag, Tag::IncumbentTwo);
    assert!(c0.poll().is_none());
}

#[test]
fn test_comm_wait_any() {
    let mut mesh = full_mesh(2);
    let c1 = mesh.remove(1);
    let mut c0 = mesh.remove(0);

    c1.send(0, Tag::Node, body("n1")).unwrap();
    c1.send(0, Tag::FinishInit, Encoded::new("")).unwrap();

    let msg = c0.wait_any(&[Tag::Node, Tag::FinishInit]).unwrap();
    assert_eq!(msg.tag, Tag::Node);
    let msg = c0.wait_any(&[Tag::Node, Tag::FinishInit]).unwrap();
    assert_eq!(msg.tag, Tag::FinishInit);
}

#[test]
fn test_comm_broadcast_discard() {
    let mut mesh = full_mesh(3);
    let c2 = mesh.remove(2);
    let mut c1 = mesh.remove(1);
    let mut c0 = mesh.remove(0);

    c2.broadcast(&[0, 1, 2], Tag::ForceTerm, &Encoded::new(""))
        .unwrap();
    assert_eq!(c0.poll().unwrap().tag, Tag::ForceTerm);
    assert_eq!(c1.poll().unwrap().tag, Tag::ForceTerm);

    // Broadcast skips self.
    let mut c2 = c2;
    assert!(c2.poll().is_none());

    c0.send(1, Tag::Idle, body("x")).unwrap();
    c0.send(1, Tag::Idle, body("y")).unwrap();
    c1.discard_queued();
    assert!(c1.poll().is_none());
}

#[test]
fn test_comm_cross_thread() {
    let mut mesh = full_mesh(2);
    let mut c1 = mesh.remove(1);
    let mut c0 = mesh.remove(0);

    let handle = thread::spawn(move || {
        let mut msg = c1.wait_tag(Tag::Node, Some(0)).unwrap();
        let text = msg.body.read_str().unwrap();
        c1.send(0, Tag::WorkerStatus, body(&text)).unwrap();
    });

    c0.send(1, Tag::Node, body("ping")).unwrap();
    let mut msg = c0
        .poll_timeout(time::Duration::from_secs(5))
        .expect("reply");
    assert_eq!(msg.from, 1);
    assert_eq!(msg.body.read_str().unwrap(), "ping");

    handle.join().unwrap();
}
