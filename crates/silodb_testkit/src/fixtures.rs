//! Test fixtures and database helpers.
//!
//! Provides temporary databases with automatic cleanup and a family of
//! persistable fixture types: a flat versioned type, sub-object and
//! sub-object-list owners, and a two-version pair for migration tests.

use silodb_core::{
    Config, Database, DbError, DbResult, FieldDesc, FieldKind, FieldValue, ObjectGraph,
    ObjectNode, ObjectValue, Oid, Persist, TypeDesc,
};
use std::path::PathBuf;
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory(Config::default())
                .expect("failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database.
    pub fn file() -> Self {
        Self::file_with(Config::default())
    }

    /// Creates a new file-based test database with a custom configuration.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db = Database::open(temp_dir.path().join("db"), config)
            .expect("failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-based, `None` if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("db"))
    }

    /// Closes the handle and reopens the same on-disk database.
    pub fn reopen(&mut self) {
        let path = self.path().expect("reopen requires a file database");
        self.db.close();
        self.db = Database::open(path, Config::default()).expect("failed to reopen database");
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &std::path::Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("file database has a path");
    f(&test_db.db, &path)
}

fn scalar(node: &ObjectNode, index: usize, what: &str) -> DbResult<FieldValue> {
    node.values
        .get(index)
        .and_then(ObjectValue::as_scalar)
        .cloned()
        .ok_or_else(|| DbError::invalid_format(what.to_string(), "missing scalar field"))
}

/// A flat versioned fixture: unique and indexed fields plus a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    /// Persisted identity.
    pub oid: Oid,
    /// Concurrency tick.
    pub tick: Option<u64>,
    /// Unique, indexed.
    pub name: String,
    /// Indexed.
    pub age: i64,
    /// Plain boolean, for bare-field filters.
    pub active: bool,
    /// Nullable text.
    pub email: Option<String>,
}

impl Person {
    /// Creates an unsaved person.
    pub fn new(name: impl Into<String>, age: i64) -> Self {
        Self {
            oid: Oid::NONE,
            tick: None,
            name: name.into(),
            age,
            active: true,
            email: None,
        }
    }
}

impl Persist for Person {
    fn type_desc() -> TypeDesc {
        TypeDesc::new(
            "Person",
            vec![
                FieldDesc::new("Name", FieldKind::Text).unique().indexed(),
                FieldDesc::new("Age", FieldKind::Int).indexed(),
                FieldDesc::new("Active", FieldKind::Bool),
                FieldDesc::new("Email", FieldKind::Text),
                FieldDesc::new("TickCount", FieldKind::UInt).version(),
            ],
        )
    }

    fn to_graph(&self, graph: &mut ObjectGraph) -> usize {
        graph.add(ObjectNode::with_identity(
            "Person",
            self.oid,
            self.tick,
            vec![
                ObjectValue::Scalar(self.name.clone().into()),
                ObjectValue::Scalar(self.age.into()),
                ObjectValue::Scalar(self.active.into()),
                ObjectValue::Scalar(
                    self.email
                        .clone()
                        .map_or(FieldValue::Null, FieldValue::Text),
                ),
                ObjectValue::Scalar(self.tick.map_or(FieldValue::Null, FieldValue::UInt)),
            ],
        ))
    }

    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self> {
        let node = graph.node(index)?;
        Ok(Self {
            oid: node.oid,
            tick: node.tick,
            name: scalar(node, 0, "Person.Name")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            age: scalar(node, 1, "Person.Age")?.as_int().unwrap_or_default(),
            active: scalar(node, 2, "Person.Active")?
                .as_bool()
                .unwrap_or_default(),
            email: scalar(node, 3, "Person.Email")?
                .as_text()
                .map(str::to_string),
        })
    }

    fn oid(&self) -> Oid {
        self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    fn tick(&self) -> Option<u64> {
        self.tick
    }

    fn set_tick(&mut self, tick: u64) {
        self.tick = Some(tick);
    }
}

/// A plain sub-object fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    /// Persisted identity.
    pub oid: Oid,
    /// Indexed.
    pub city: String,
    /// Plain text.
    pub street: String,
}

impl Address {
    /// Creates an unsaved address.
    pub fn new(city: impl Into<String>, street: impl Into<String>) -> Self {
        Self {
            oid: Oid::NONE,
            city: city.into(),
            street: street.into(),
        }
    }
}

impl Persist for Address {
    fn type_desc() -> TypeDesc {
        TypeDesc::new(
            "Address",
            vec![
                FieldDesc::new("City", FieldKind::Text).indexed(),
                FieldDesc::new("Street", FieldKind::Text),
            ],
        )
    }

    fn to_graph(&self, graph: &mut ObjectGraph) -> usize {
        graph.add(ObjectNode::with_identity(
            "Address",
            self.oid,
            None,
            vec![
                ObjectValue::Scalar(self.city.clone().into()),
                ObjectValue::Scalar(self.street.clone().into()),
            ],
        ))
    }

    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self> {
        let node = graph.node(index)?;
        Ok(Self {
            oid: node.oid,
            city: scalar(node, 0, "Address.City")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            street: scalar(node, 1, "Address.Street")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn oid(&self) -> Oid {
        self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }
}

/// An owner of single sub-objects, with a diamond when both reference the
/// same address.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    /// Persisted identity.
    pub oid: Oid,
    /// Plain text.
    pub name: String,
    /// Optional sub-object.
    pub home: Option<Address>,
    /// Optional sub-object.
    pub work: Option<Address>,
}

impl Contact {
    /// Creates an unsaved contact.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            oid: Oid::NONE,
            name: name.into(),
            home: None,
            work: None,
        }
    }
}

impl Persist for Contact {
    fn type_desc() -> TypeDesc {
        TypeDesc::new(
            "Contact",
            vec![
                FieldDesc::new("Name", FieldKind::Text),
                FieldDesc::new("Home", FieldKind::Ref).target("Address"),
                FieldDesc::new("Work", FieldKind::Ref).target("Address"),
            ],
        )
    }

    fn type_descs() -> Vec<TypeDesc> {
        vec![Address::type_desc(), Self::type_desc()]
    }

    fn to_graph(&self, graph: &mut ObjectGraph) -> usize {
        let home = self.home.as_ref().map(|a| a.to_graph(graph));
        let work = self.work.as_ref().map(|a| a.to_graph(graph));
        graph.add(ObjectNode::with_identity(
            "Contact",
            self.oid,
            None,
            vec![
                ObjectValue::Scalar(self.name.clone().into()),
                ObjectValue::Sub(home),
                ObjectValue::Sub(work),
            ],
        ))
    }

    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self> {
        let node = graph.node(index)?;
        let sub = |value: &ObjectValue| -> DbResult<Option<Address>> {
            match value {
                ObjectValue::Sub(Some(child)) => Ok(Some(Address::from_graph(graph, *child)?)),
                ObjectValue::Sub(None) => Ok(None),
                _ => Err(DbError::invalid_format("Contact", "expected sub-object")),
            }
        };
        Ok(Self {
            oid: node.oid,
            name: scalar(node, 0, "Contact.Name")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            home: sub(&node.values[1])?,
            work: sub(&node.values[2])?,
        })
    }

    fn oid(&self) -> Oid {
        self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }
}

/// An owner of a sub-object list.
#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    /// Persisted identity.
    pub oid: Oid,
    /// Plain text.
    pub name: String,
    /// Sub-object list.
    pub sites: Vec<Address>,
}

impl Team {
    /// Creates an unsaved team.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            oid: Oid::NONE,
            name: name.into(),
            sites: Vec::new(),
        }
    }
}

impl Persist for Team {
    fn type_desc() -> TypeDesc {
        TypeDesc::new(
            "Team",
            vec![
                FieldDesc::new("Name", FieldKind::Text),
                FieldDesc::new("Sites", FieldKind::RefList).target("Address"),
            ],
        )
    }

    fn type_descs() -> Vec<TypeDesc> {
        vec![Address::type_desc(), Self::type_desc()]
    }

    fn to_graph(&self, graph: &mut ObjectGraph) -> usize {
        let sites = self.sites.iter().map(|a| a.to_graph(graph)).collect();
        graph.add(ObjectNode::with_identity(
            "Team",
            self.oid,
            None,
            vec![
                ObjectValue::Scalar(self.name.clone().into()),
                ObjectValue::SubList(sites),
            ],
        ))
    }

    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self> {
        let node = graph.node(index)?;
        let ObjectValue::SubList(children) = &node.values[1] else {
            return Err(DbError::invalid_format("Team", "expected sub-object list"));
        };
        Ok(Self {
            oid: node.oid,
            name: scalar(node, 0, "Team.Name")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            sites: children
                .iter()
                .map(|&child| Address::from_graph(graph, child))
                .collect::<DbResult<_>>()?,
        })
    }

    fn oid(&self) -> Oid {
        self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }
}

/// First revision of the migration fixture pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleV1 {
    /// Persisted identity.
    pub oid: Oid,
    /// Survives migration unchanged.
    pub title: String,
    /// Int in this revision, text in the next.
    pub rating: i64,
    /// Dropped by the next revision.
    pub draft: bool,
}

impl ArticleV1 {
    /// Creates an unsaved article.
    pub fn new(title: impl Into<String>, rating: i64) -> Self {
        Self {
            oid: Oid::NONE,
            title: title.into(),
            rating,
            draft: false,
        }
    }
}

impl Persist for ArticleV1 {
    fn type_desc() -> TypeDesc {
        TypeDesc::new(
            "Article",
            vec![
                FieldDesc::new("Title", FieldKind::Text),
                FieldDesc::new("Rating", FieldKind::Int),
                FieldDesc::new("Draft", FieldKind::Bool),
            ],
        )
    }

    fn to_graph(&self, graph: &mut ObjectGraph) -> usize {
        graph.add(ObjectNode::with_identity(
            "Article",
            self.oid,
            None,
            vec![
                ObjectValue::Scalar(self.title.clone().into()),
                ObjectValue::Scalar(self.rating.into()),
                ObjectValue::Scalar(self.draft.into()),
            ],
        ))
    }

    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self> {
        let node = graph.node(index)?;
        Ok(Self {
            oid: node.oid,
            title: scalar(node, 0, "Article.Title")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            rating: scalar(node, 1, "Article.Rating")?
                .as_int()
                .unwrap_or_default(),
            draft: scalar(node, 2, "Article.Draft")?
                .as_bool()
                .unwrap_or_default(),
        })
    }

    fn oid(&self) -> Oid {
        self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }
}

/// Second revision of the migration fixture pair: `Rating` becomes text,
/// `Draft` is dropped, `Pages` and a version field are added.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleV2 {
    /// Persisted identity.
    pub oid: Oid,
    /// Concurrency tick, added by migration.
    pub tick: Option<u64>,
    /// Survives migration unchanged.
    pub title: String,
    /// Converted from the old int rating.
    pub rating: String,
    /// Added; null (zero) after migration.
    pub pages: i64,
}

impl Persist for ArticleV2 {
    fn type_desc() -> TypeDesc {
        TypeDesc::new(
            "Article",
            vec![
                FieldDesc::new("Title", FieldKind::Text),
                FieldDesc::new("Rating", FieldKind::Text),
                FieldDesc::new("Pages", FieldKind::Int),
                FieldDesc::new("TickCount", FieldKind::UInt).version(),
            ],
        )
    }

    fn to_graph(&self, graph: &mut ObjectGraph) -> usize {
        graph.add(ObjectNode::with_identity(
            "Article",
            self.oid,
            self.tick,
            vec![
                ObjectValue::Scalar(self.title.clone().into()),
                ObjectValue::Scalar(self.rating.clone().into()),
                ObjectValue::Scalar(self.pages.into()),
                ObjectValue::Scalar(self.tick.map_or(FieldValue::Null, FieldValue::UInt)),
            ],
        ))
    }

    fn from_graph(graph: &ObjectGraph, index: usize) -> DbResult<Self> {
        let node = graph.node(index)?;
        Ok(Self {
            oid: node.oid,
            tick: node.tick,
            title: scalar(node, 0, "Article.Title")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            rating: scalar(node, 1, "Article.Rating")?
                .as_text()
                .unwrap_or_default()
                .to_string(),
            pages: scalar(node, 2, "Article.Pages")?
                .as_int()
                .unwrap_or_default(),
        })
    }

    fn oid(&self) -> Oid {
        self.oid
    }

    fn set_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    fn tick(&self) -> Option<u64> {
        self.tick
    }

    fn set_tick(&mut self, tick: u64) {
        self.tick = Some(tick);
    }
}

/// Saves `count` people named `P1..=Pcount` with ages `1..=count`.
pub fn populate_people(db: &Database, count: i64) -> Vec<Oid> {
    (1..=count)
        .map(|i| {
            let mut person = Person::new(format!("P{i}"), i);
            person.active = i % 2 == 0;
            db.save(&mut person).expect("failed to save fixture person")
        })
        .collect()
}
