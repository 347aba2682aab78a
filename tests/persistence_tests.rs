use mikado::layers::base;
use mikado::{persistent_layers, Command, Core, FileStore, Goals, Graph, PersistentStack, Session};
use pretty_assertions::assert_eq;

fn zoomed_stack() -> PersistentStack {
    let mut stack = persistent_layers(Goals::new("Root", None));
    stack.accept(Command::add("A", 1)); // 2
    stack.accept(Command::add("B", 2)); // 3
    stack.accept(Command::add("C", 3)); // 4
    stack.accept(Command::toggle_zoom(2));
    stack.accept(Command::toggle_zoom(3));
    stack
}

#[test]
fn test_stacked_zoom_survives_repeated_saves() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    let mut stack = zoomed_stack();
    assert_eq!(stack.export(), vec![(1, 1), (2, 2), (3, 3)]);
    assert!(store.save(&mut stack).unwrap() > 0);
    // nothing new to write
    assert_eq!(store.save(&mut stack).unwrap(), 0);

    let mut loaded = store.load(None).unwrap();
    assert_eq!(loaded.export(), stack.export());
    assert_eq!(loaded.q(), stack.q());

    // saving a freshly loaded stack must not append anything
    assert_eq!(store.save(&mut loaded).unwrap(), 0);
    let reloaded = store.load(None).unwrap();
    assert_eq!(reloaded.export(), stack.export());
    assert_eq!(reloaded.q(), stack.q());
}

#[test]
fn test_unzoom_after_reload_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut stack = zoomed_stack();
    store.save(&mut stack).unwrap();

    let mut loaded = store.load(None).unwrap();
    loaded.accept(Command::toggle_zoom(3));
    assert_eq!(loaded.top(), 2);
    assert!(store.save(&mut loaded).unwrap() > 0);

    let reloaded = store.load(None).unwrap();
    assert_eq!(reloaded.top(), 2);
    assert_eq!(reloaded.q(), loaded.q());
}

#[test]
fn test_compaction_keeps_zoom_and_selection() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut stack = zoomed_stack();
    stack.accept(Command::select(4));

    store.compact(&mut stack).unwrap();
    assert!(store.read_events().unwrap().is_empty());

    let mut loaded = store.load(None).unwrap();
    assert_eq!(loaded.export(), stack.export());
    assert_eq!(loaded.q(), stack.q());
    assert_eq!(loaded.q().selection(), Some(4));

    // events written after compaction are replayed on top of the snapshot
    loaded.accept(Command::toggle_zoom(3));
    loaded.accept(Command::add("D", 2));
    store.save(&mut loaded).unwrap();
    let reloaded = store.load(None).unwrap();
    assert_eq!(reloaded.q(), loaded.q());
    assert_eq!(base(&reloaded).name(5), Some("D"));
}

#[test]
fn test_session_restart_keeps_zoom() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FileStore::open(dir.path()).unwrap();
        let core = Core::new(Session::open(store, "Root").unwrap());
        core.apply(vec![
            Command::add("A", 1),
            Command::add("B", 2),
            Command::toggle_zoom(2),
        ])
        .unwrap();
        // an empty batch saves nothing new
        core.apply(vec![]).unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    let session = Session::open(store, "Root").unwrap();
    let result = session.render();
    assert_eq!(result.by_id(1).unwrap().attrs.get("Zoom").map(String::as_str), Some("A"));
    assert_eq!(result.ids().len(), 3);
    assert_eq!(session.export().zoom, vec![(1, 1), (2, 2)]);
}
