//! The event queue: a doubly linked FIFO with two insertion points.
//!
//! Entries live in a slab; links are expressed as [`Slot`] handles rather
//! than pointers. A slot names a place an entry key can be written: the
//! queue head, or the `next` cell of some entry. Each entry remembers the
//! slot that names it (`prev`), so unlinking is one slot write plus one
//! `prev` fix-up, with no sentinel entry.
//!
//! Two cursors drive the scheduling discipline:
//!
//! * `tail` — where breadth-first arms insert. Always names the slot past
//!   the last entry.
//! * `depth_first` — where depth-first arms insert. Reset to the head each
//!   time an event is popped, and advanced past every depth-first insertion,
//!   so events armed from within a firing event run immediately after it,
//!   in arming order, without starving the rest of the queue.

use std::rc::Weak;

use slab::Slab;

use crate::event::FireEvent;

/// A place an entry key can be stored: the queue head or the `next` cell of
/// the entry with the given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Head,
    After(usize),
}

struct Entry {
    event: Weak<dyn FireEvent>,
    next: Option<usize>,
    prev: Slot,
}

pub(crate) struct Queue {
    entries: Slab<Entry>,
    head: Option<usize>,
    tail: Slot,
    depth_first: Slot,
}

impl Queue {
    pub(crate) fn new() -> Queue {
        Queue {
            entries: Slab::new(),
            head: None,
            tail: Slot::Head,
            depth_first: Slot::Head,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn read(&self, slot: Slot) -> Option<usize> {
        match slot {
            Slot::Head => self.head,
            Slot::After(key) => self.entries[key].next,
        }
    }

    fn write(&mut self, slot: Slot, value: Option<usize>) {
        match slot {
            Slot::Head => self.head = value,
            Slot::After(key) => self.entries[key].next = value,
        }
    }

    fn link(&mut self, at: Slot, event: Weak<dyn FireEvent>) -> usize {
        let next = self.read(at);
        let key = self.entries.insert(Entry {
            event,
            next,
            prev: at,
        });
        self.write(at, Some(key));
        if let Some(next) = next {
            self.entries[next].prev = Slot::After(key);
        }
        key
    }

    /// Insert at the depth-first point and advance it past the new entry.
    pub(crate) fn arm_depth_first(&mut self, event: Weak<dyn FireEvent>) -> usize {
        let at = self.depth_first;
        let key = self.link(at, event);
        self.depth_first = Slot::After(key);
        if self.tail == at {
            self.tail = Slot::After(key);
        }
        key
    }

    /// Insert at the tail.
    pub(crate) fn arm_breadth_first(&mut self, event: Weak<dyn FireEvent>) -> usize {
        let at = self.tail;
        let key = self.link(at, event);
        self.tail = Slot::After(key);
        key
    }

    /// Remove an entry, repairing links and cursors.
    pub(crate) fn unlink(&mut self, key: usize) {
        let entry = self.entries.remove(key);
        self.write(entry.prev, entry.next);
        if let Some(next) = entry.next {
            self.entries[next].prev = entry.prev;
        }
        if self.tail == Slot::After(key) {
            self.tail = entry.prev;
        }
        if self.depth_first == Slot::After(key) {
            self.depth_first = entry.prev;
        }
    }

    /// Detach the head entry and reset the depth-first point to the head.
    ///
    /// The caller clears the popped event's queued key and fires it.
    pub(crate) fn pop(&mut self) -> Option<Weak<dyn FireEvent>> {
        let key = self.head?;
        let event = self.entries[key].event.clone();
        self.unlink(key);
        self.depth_first = Slot::Head;
        Some(event)
    }

    /// Reset the depth-first insertion point to the head.
    ///
    /// Called after each fire completes so arms performed outside of any
    /// firing event land at the front of the queue.
    pub(crate) fn reset_depth_first(&mut self) {
        self.depth_first = Slot::Head;
    }

    /// Forget every queued entry, clearing each surviving event's key so
    /// later drops do not try to unlink.
    ///
    /// Used during loop teardown when events were leaked onto the queue.
    pub(crate) fn clear_for_shutdown(&mut self) {
        for (_, entry) in self.entries.iter() {
            if let Some(event) = entry.event.upgrade() {
                event.handle().clear_key();
            }
        }
        self.entries.clear();
        self.head = None;
        self.tail = Slot::Head;
        self.depth_first = Slot::Head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventHandle;
    use std::rc::Rc;

    struct Stub;

    impl FireEvent for Stub {
        fn fire(&self) -> Option<Rc<dyn FireEvent>> {
            None
        }
        fn handle(&self) -> &EventHandle {
            unreachable!("queue tests never fire")
        }
    }

    impl crate::trace::Trace for Stub {
        fn append_trace(&self, out: &mut Vec<&'static str>) {
            out.push("Stub");
        }
    }

    struct Stubs(Vec<(u32, Rc<Stub>)>);

    impl Stubs {
        fn new() -> Stubs {
            Stubs(Vec::new())
        }

        fn add(&mut self, id: u32) -> Weak<dyn FireEvent> {
            let rc = Rc::new(Stub);
            let weak_rc: Weak<Stub> = Rc::downgrade(&rc);
            let weak: Weak<dyn FireEvent> = weak_rc;
            self.0.push((id, rc));
            weak
        }

        fn drain(&self, queue: &mut Queue) -> Vec<u32> {
            let mut order = Vec::new();
            while let Some(weak) = queue.pop() {
                let rc = weak.upgrade().unwrap();
                let ptr = Rc::as_ptr(&rc) as *const ();
                let id = self
                    .0
                    .iter()
                    .find(|(_, s)| Rc::as_ptr(s) as *const () == ptr)
                    .expect("popped an event the test did not insert")
                    .0;
                order.push(id);
            }
            order
        }
    }

    #[test]
    fn breadth_first_is_fifo() {
        let mut queue = Queue::new();
        let mut stubs = Stubs::new();
        let (wa, wb, wc) = (stubs.add(1), stubs.add(2), stubs.add(3));
        queue.arm_breadth_first(wa);
        queue.arm_breadth_first(wb);
        queue.arm_breadth_first(wc);
        assert_eq!(stubs.drain(&mut queue), vec![1, 2, 3]);
    }

    #[test]
    fn depth_first_inserts_at_front_between_fires() {
        let mut queue = Queue::new();
        let mut stubs = Stubs::new();
        let (wa, wb) = (stubs.add(1), stubs.add(2));
        queue.arm_breadth_first(wa);
        queue.arm_breadth_first(wb);
        // Two depth-first arms keep their own order ahead of the rest.
        let (wx, wy) = (stubs.add(10), stubs.add(11));
        queue.arm_depth_first(wx);
        queue.arm_depth_first(wy);
        let wc = stubs.add(3);
        queue.arm_breadth_first(wc);
        assert_eq!(stubs.drain(&mut queue), vec![10, 11, 1, 2, 3]);
    }

    #[test]
    fn unlink_from_middle_repairs_links() {
        let mut queue = Queue::new();
        let mut stubs = Stubs::new();
        let (wa, wb, wc) = (stubs.add(1), stubs.add(2), stubs.add(3));
        queue.arm_breadth_first(wa);
        let key_b = queue.arm_breadth_first(wb);
        queue.arm_breadth_first(wc);
        queue.unlink(key_b);
        assert_eq!(stubs.drain(&mut queue), vec![1, 3]);
    }

    #[test]
    fn unlink_tail_moves_tail_back() {
        let mut queue = Queue::new();
        let mut stubs = Stubs::new();
        let (wa, wb) = (stubs.add(1), stubs.add(2));
        queue.arm_breadth_first(wa);
        let key_b = queue.arm_breadth_first(wb);
        queue.unlink(key_b);
        let wc = stubs.add(3);
        queue.arm_breadth_first(wc);
        assert_eq!(stubs.drain(&mut queue), vec![1, 3]);
    }

    #[test]
    fn pop_resets_depth_first_to_head() {
        let mut queue = Queue::new();
        let mut stubs = Stubs::new();
        let (wa, wb) = (stubs.add(1), stubs.add(2));
        queue.arm_breadth_first(wa);
        queue.arm_breadth_first(wb);
        let _ = queue.pop();
        // A depth-first arm after a pop lands ahead of everything queued.
        let wx = stubs.add(10);
        queue.arm_depth_first(wx);
        assert_eq!(stubs.drain(&mut queue), vec![10, 2]);
    }
}
