//! Fixture shards and domain helpers.
//!
//! Two shards cover the common test scenarios: `PeopleShard` holds persons
//! and a one-to-many friendship relation, `LibraryShard` holds books and
//! authors linked one-to-one.

use shardgraph_core::{
    entity, properties, shard, CollectionRead, CollectionWrite, CommandError, DomainModel,
    EngineConfig, MemoryRepository, Model, RelationRead, RelationWrite, RepositoryStorage, Snapshot,
    UndoRedoDomainModel,
};
use std::sync::Arc;

entity! {
    /// A person in the people shard.
    pub struct Person;
}

entity! {
    /// A book in the library shard.
    pub struct Book;
}

entity! {
    /// An author in the library shard.
    pub struct Author;
}

properties! {
    /// Person record.
    pub struct PersonProps {
        /// Display name.
        pub name: String,
        /// Age in years.
        pub age: i64,
        /// Optional nickname.
        pub nickname: Option<String>,
    }
}

impl PersonProps {
    /// A person without a nickname.
    pub fn new(name: impl Into<String>, age: i64) -> Self {
        Self {
            name: name.into(),
            age,
            nickname: None,
        }
    }

    /// Returns a copy with `name` replaced.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

properties! {
    /// Book record.
    pub struct BookProps {
        /// Title.
        pub title: String,
        /// Publication year.
        pub year: i64,
    }
}

properties! {
    /// Author record.
    pub struct AuthorProps {
        /// Display name.
        pub name: String,
    }
}

shard! {
    /// Persons and their friendships.
    pub struct PeopleShard : "people" {
        collections {
            persons: Person => PersonProps,
        }
        relations {
            friends: Person => Person = OneToMany,
        }
    }
}

shard! {
    /// Books, authors and who wrote what.
    pub struct LibraryShard : "library" {
        collections {
            books: Book => BookProps,
            authors: Author => AuthorProps,
        }
        relations {
            written_by: Book => Author = OneToOne,
        }
    }
}

/// A model with both fixture shards registered.
pub fn test_model() -> Model {
    Model::builder()
        .shard::<PeopleShard>()
        .shard::<LibraryShard>()
        .build()
}

/// Storage over a fresh in-memory repository.
pub type MemoryStorage = RepositoryStorage<MemoryRepository>;

/// A domain model wired to in-memory storage.
pub struct TestDomain {
    /// The domain model.
    pub domain: DomainModel,
    /// The storage it persists to, kept for inspection.
    pub storage: Arc<MemoryStorage>,
}

impl TestDomain {
    /// Creates a domain over [`test_model`] with the default config.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates a domain over [`test_model`] with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let storage = Arc::new(RepositoryStorage::new(MemoryRepository::new()));
        let domain = DomainModel::builder(test_model())
            .storage(storage.clone())
            .config(config)
            .build();
        Self { domain, storage }
    }

    /// Wraps the domain in an undo/redo history.
    pub fn history(&self) -> UndoRedoDomainModel {
        UndoRedoDomainModel::new(self.domain.clone())
    }
}

impl Default for TestDomain {
    fn default() -> Self {
        Self::new()
    }
}

/// The people shard of `model`.
///
/// # Panics
///
/// Panics if the model has no people shard.
pub fn people(model: &Model) -> &PeopleShard {
    model
        .shard::<PeopleShard>()
        .unwrap_or_else(|err| panic!("people shard missing: {err}"))
}

/// The library shard of `model`.
///
/// # Panics
///
/// Panics if the model has no library shard.
pub fn library(model: &Model) -> &LibraryShard {
    model
        .shard::<LibraryShard>()
        .unwrap_or_else(|err| panic!("library shard missing: {err}"))
}

/// Adds a person inside a command.
pub fn add_person(snapshot: &mut Snapshot, name: &str, age: i64) -> Result<Person, CommandError> {
    let mut shard = snapshot.shard_mut::<PeopleShard>()?;
    Ok(shard
        .collection(|s| &mut s.persons)?
        .add(PersonProps::new(name, age))?)
}

/// Renames a person inside a command.
pub fn rename_person(snapshot: &mut Snapshot, person: Person, name: &str) -> Result<(), CommandError> {
    let mut shard = snapshot.shard_mut::<PeopleShard>()?;
    shard
        .collection(|s| &mut s.persons)?
        .modify(person, |props| props.renamed(name))?;
    Ok(())
}

/// Removes a person and every friendship it takes part in.
pub fn remove_person(snapshot: &mut Snapshot, person: Person) -> Result<(), CommandError> {
    let mut shard = snapshot.shard_mut::<PeopleShard>()?;
    let friends = &shard.shard().friends;
    let mut pairs: Vec<_> = friends
        .children(person)
        .map(|child| (person, child))
        .chain(friends.parents(person).map(|parent| (parent, person)))
        .collect();
    // A self-friendship shows up from both sides.
    pairs.sort();
    pairs.dedup();
    let mut friends = shard.relation(|s| &mut s.friends)?;
    for (parent, child) in pairs {
        friends.remove(parent, child)?;
    }
    shard.collection(|s| &mut s.persons)?.remove(person)?;
    Ok(())
}

/// Links `parent` to `child` in the friendship relation.
pub fn befriend(snapshot: &mut Snapshot, parent: Person, child: Person) -> Result<(), CommandError> {
    let mut shard = snapshot.shard_mut::<PeopleShard>()?;
    shard.relation(|s| &mut s.friends)?.add(parent, child)?;
    Ok(())
}

/// Number of persons in the published model.
pub fn person_count(domain: &DomainModel) -> usize {
    people(&domain.model()).persons.len()
}
