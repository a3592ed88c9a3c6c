//! Save, update, load and history persistence through the storage ports.

use shardgraph_core::{
    CollectionRead, CollectionWrite, CommitOutcome, CoreError, DomainModel, EngineConfig, Entity,
    RelationRead, UndoRedoDomainModel,
};
use shardgraph_storage::Storage;
use shardgraph_testkit::prelude::*;

fn seed(domain: &DomainModel) -> (Person, Person, Book) {
    domain
        .execute(|s| {
            let ada = add_person(s, "Ada", 36)?;
            let bob = add_person(s, "Bob", 41)?;
            befriend(s, ada, bob)?;
            let mut library = s.shard_mut::<LibraryShard>()?;
            let book = library.collection(|s| &mut s.books)?.add(BookProps {
                title: "The Dispossessed".into(),
                year: 1974,
            })?;
            Ok((ada, bob, book))
        })
        .unwrap()
}

fn reopen(harness: &TestDomain) -> DomainModel {
    DomainModel::builder(test_model())
        .storage(harness.storage.clone())
        .build()
}

#[test]
fn save_then_load_into_fresh_model() {
    init_tracing();
    let harness = TestDomain::new();
    let (ada, bob, book) = seed(&harness.domain);
    harness.domain.save().unwrap();

    let restored = reopen(&harness);
    let report = restored.load(false).unwrap();
    assert_eq!(report.outcome, CommitOutcome::Committed);

    let model = restored.model();
    assert_eq!(people(&model).persons.get(ada).unwrap().name, "Ada");
    assert!(people(&model).friends.are_linked(ada, bob));
    assert_eq!(library(&model).books.get(book).unwrap().year, 1974);
    assert_eq!(model.images().unwrap(), harness.domain.model().images().unwrap());
}

#[test]
fn load_into_populated_model_needs_force() {
    let harness = TestDomain::new();
    seed(&harness.domain);
    harness.domain.save().unwrap();

    let err = harness.domain.load(false).unwrap_err();
    assert!(matches!(err, CoreError::ModelLoading(_)));
    assert!(matches!(err.cause(), CoreError::NonEmptyModel { .. }));

    let report = harness.domain.load(true).unwrap();
    assert_eq!(report.outcome, CommitOutcome::Discarded);
}

#[test]
fn forced_load_discards_unsaved_edits() {
    let harness = TestDomain::new();
    let (ada, ..) = seed(&harness.domain);
    harness.domain.save().unwrap();
    harness
        .domain
        .execute(|s| rename_person(s, ada, "Augusta"))
        .unwrap();

    let report = harness.domain.load(true).unwrap();
    assert!(report.is_committed());
    assert_eq!(
        people(&harness.domain.model()).persons.get(ada).unwrap().name,
        "Ada"
    );
}

#[test]
fn update_persists_only_deltas() {
    let harness = TestDomain::new();
    seed(&harness.domain);
    harness.domain.save().unwrap();

    let (carol, report) = harness.domain.run(|s| add_person(s, "Carol", 29)).unwrap();
    harness.domain.update(&report.changes).unwrap();

    let restored = reopen(&harness);
    restored.load(false).unwrap();
    assert!(people(&restored.model()).persons.contains(carol));
    assert_eq!(person_count(&restored), 3);
}

#[test]
fn write_through_persists_every_commit() {
    let harness = TestDomain::with_config(EngineConfig::new().write_through(true));
    harness.domain.execute(|s| add_person(s, "Ada", 36)).unwrap();
    harness.domain.execute(|s| add_person(s, "Bob", 41)).unwrap();

    let restored = reopen(&harness);
    restored.load(false).unwrap();
    assert_eq!(person_count(&restored), 2);
}

#[test]
fn lazy_collection_load() {
    let harness = TestDomain::new();
    let (_, _, book) = seed(&harness.domain);
    harness.domain.save().unwrap();

    let restored = reopen(&harness);
    restored
        .load_collection::<LibraryShard>("books", false)
        .unwrap();
    let model = restored.model();
    assert!(library(&model).books.contains(book));
    assert!(people(&model).persons.is_empty());

    let err = restored
        .load_collection::<LibraryShard>("shelves", false)
        .unwrap_err();
    assert!(matches!(err.cause(), CoreError::UnknownSet { .. }));
}

#[test]
fn dangling_link_is_rejected_on_load() {
    let harness = TestDomain::new();
    let (ada, ..) = seed(&harness.domain);
    harness.domain.save().unwrap();

    // Remove Ada's row behind the engine's back.
    let schema = harness.domain.model().shard_schema("people").unwrap();
    let mut image = harness.storage.load(&schema).unwrap();
    image.collections[0].rows.retain(|row| row.entity != ada.key());
    harness.storage.save(&[image]).unwrap();

    let err = reopen(&harness).load(false).unwrap_err();
    assert!(matches!(err.cause(), CoreError::KeyNotFound { .. }));
}

#[test]
fn storage_is_required() {
    let domain = DomainModel::new(test_model());
    assert!(matches!(domain.save(), Err(CoreError::StorageNotConfigured)));
    assert!(matches!(domain.load(false), Err(CoreError::StorageNotConfigured)));
}

#[test]
fn undo_history_round_trips_through_storage() {
    let harness = TestDomain::new();
    let history = harness.history();
    let ada = history.execute(|s| add_person(s, "Ada", 36)).unwrap();
    history.execute(|s| rename_person(s, ada, "Augusta")).unwrap();
    history.save_history().unwrap();
    let saved = history.undo_items();

    let restored = UndoRedoDomainModel::new(
        DomainModel::builder(history.model().as_ref().clone())
            .storage(harness.storage.clone())
            .build(),
    );
    restored.load_history().unwrap();
    assert_eq!(restored.undo_items(), saved);

    restored.undo().unwrap();
    assert_eq!(people(&restored.model()).persons.get(ada).unwrap().name, "Ada");
    restored.undo().unwrap();
    assert_eq!(person_count(restored.domain()), 0);
}
