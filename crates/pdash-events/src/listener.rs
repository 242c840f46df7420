use std::sync::Arc;

/// Receives "data added" / "data removed" notifications for names under the
/// prefix it registered with.
pub trait RepositoryListener: Send + Sync {
    fn data_added(&self, name: &str);
    fn data_removed(&self, name: &str);

    /// Several names added at once. Defaults to one call per name.
    fn data_added_batch(&self, names: &[String]) {
        for name in names {
            self.data_added(name);
        }
    }

    /// Several names removed at once. Defaults to one call per name.
    fn data_removed_batch(&self, names: &[String]) {
        for name in names {
            self.data_removed(name);
        }
    }
}

pub type ListenerRef = Arc<dyn RepositoryListener>;

/// Identity of a registration: the address of the shared listener, ignoring
/// the vtable half of the fat pointer.
pub fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        added: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    impl RepositoryListener for Recorder {
        fn data_added(&self, name: &str) {
            self.added.lock().push(name.to_string());
        }
        fn data_removed(&self, name: &str) {
            self.removed.lock().push(name.to_string());
        }
    }

    #[test]
    fn batch_defaults_to_single_calls() {
        let r = Recorder::default();
        r.data_added_batch(&["a".into(), "b".into()]);
        r.data_removed_batch(&["c".into()]);
        assert_eq!(*r.added.lock(), vec!["a", "b"]);
        assert_eq!(*r.removed.lock(), vec!["c"]);
    }

    #[test]
    fn identity_is_by_allocation() {
        let a: ListenerRef = Arc::new(Recorder::default());
        let b: ListenerRef = Arc::new(Recorder::default());
        let a2 = Arc::clone(&a);
        assert!(same_listener(&a, &a2));
        assert!(!same_listener(&a, &b));
    }
}
