use hashbrown::{HashMap, HashSet};

use super::PathNode;
use crate::context::Context;
use crate::dialect::Dialect;
use crate::error::{KilnError, Result};
use crate::kiln_trace_preload;
use crate::model::{
    AssociationDef, AssociationKind, Loaded, Metadata, ModelDef, Record, describe_def, hydrate,
};
use crate::query::Query;
use crate::store::Store;
use crate::value::{Key, Value};

/// Bookkeeping column carrying the owner key of each loaded target.
const MATCH_KEY: &str = "__kiln_match_key";

type Matched = Vec<(Option<Key>, Box<dyn Record>)>;

/// Loads association targets for a set of already fetched records.
pub struct Preloader<'a> {
    store: &'a mut dyn Store,
    dialect: &'a dyn Dialect,
    ctx: &'a Context,
}

impl<'a> Preloader<'a> {
    pub fn new(store: &'a mut dyn Store, dialect: &'a dyn Dialect, ctx: &'a Context) -> Self {
        Self {
            store,
            dialect,
            ctx,
        }
    }

    /// Loads every edge of `forest` onto `roots`, which are all of type `def`.
    ///
    /// Edges are assigned in order; if one fails, edges assigned before it
    /// stay assigned.
    pub fn run(
        &mut self,
        def: &'static ModelDef,
        roots: &mut [&mut dyn Record],
        forest: &[PathNode],
    ) -> Result<()> {
        if roots.is_empty() {
            return Ok(());
        }
        for node in forest {
            let assoc = def.association(node.field)?;
            let meta = describe_def(assoc.target_def(), self.ctx)?;
            match assoc.kind {
                AssociationKind::BelongsTo => self.belongs_to(def, assoc, &meta, roots, node)?,
                AssociationKind::HasOne | AssociationKind::HasMany => {
                    self.has(def, assoc, &meta, roots, node)?
                }
                AssociationKind::ManyToMany => self.many_to_many(def, assoc, &meta, roots, node)?,
            }
        }
        Ok(())
    }

    fn belongs_to(
        &mut self,
        owner: &'static ModelDef,
        assoc: &AssociationDef,
        meta: &Metadata,
        roots: &mut [&mut dyn Record],
        node: &PathNode,
    ) -> Result<()> {
        let fk = assoc.foreign_key(owner);
        require_column(owner, &fk)?;
        let references = assoc.references(owner)?;
        let (root_keys, values) = collect_keys(roots, &fk);
        kiln_trace_preload!(owner.name, assoc.field, values.len());

        let matched = if values.is_empty() {
            Vec::new()
        } else {
            let column = format!("{}.{}", meta.alias, references);
            let query = Query::new().r#where(format!("{column} IN (?)"), vec![Value::List(values)]);
            self.fetch(meta, query, column, &node.children)?
        };

        let mut index: HashMap<&Key, usize> = HashMap::with_capacity(matched.len());
        for (i, (key, _)) in matched.iter().enumerate() {
            if let Some(key) = key {
                index.entry(key).or_insert(i);
            }
        }
        for (root, key) in roots.iter_mut().zip(root_keys) {
            let target = key
                .and_then(|k| index.get(&k).copied())
                .map(|i| matched[i].1.boxed_clone());
            root.assign(assoc.field, Loaded::One(target))?;
        }
        Ok(())
    }

    fn has(
        &mut self,
        owner: &'static ModelDef,
        assoc: &AssociationDef,
        meta: &Metadata,
        roots: &mut [&mut dyn Record],
        node: &PathNode,
    ) -> Result<()> {
        let references = assoc.references(owner)?;
        let fk = assoc.foreign_key(owner);
        let (root_keys, values) = collect_keys(roots, references);
        kiln_trace_preload!(owner.name, assoc.field, values.len());

        let matched = if values.is_empty() {
            Vec::new()
        } else {
            let column = format!("{}.{}", meta.alias, fk);
            let mut query = Query::new().r#where(format!("{column} IN (?)"), vec![Value::List(values)]);
            if let Some(order) = assoc.order_by {
                query = query.order(order);
            }
            self.fetch(meta, query, column, &node.children)?
        };

        assign_grouped(assoc, roots, root_keys, &matched)
    }

    fn many_to_many(
        &mut self,
        owner: &'static ModelDef,
        assoc: &AssociationDef,
        meta: &Metadata,
        roots: &mut [&mut dyn Record],
        node: &PathNode,
    ) -> Result<()> {
        let through = assoc.through.ok_or_else(|| KilnError::MalformedPath {
            path: format!("{}.{}", owner.name, assoc.field),
        })?;
        let references = assoc.references(owner)?;
        let owner_column = format!("{}.{}", through, assoc.foreign_key(owner));
        let target_column = format!("{}.{}", through, assoc.target_key());
        let target_pk = meta.primary_key()?.column;
        let (root_keys, values) = collect_keys(roots, references);
        kiln_trace_preload!(owner.name, assoc.field, values.len());

        let matched = if values.is_empty() {
            Vec::new()
        } else {
            let mut query = Query::new()
                .join(
                    through,
                    format!("{} = {}.{}", target_column, meta.alias, target_pk),
                    Vec::new(),
                )
                .r#where(format!("{owner_column} IN (?)"), vec![Value::List(values)]);
            if let Some(order) = assoc.order_by {
                query = query.order(order);
            }
            self.fetch(meta, query, owner_column, &node.children)?
        };

        assign_grouped(assoc, roots, root_keys, &matched)
    }

    /// Runs one batch query, hydrates targets and loads their own edges.
    fn fetch(
        &mut self,
        meta: &Metadata,
        query: Query,
        match_column: String,
        children: &[PathNode],
    ) -> Result<Matched> {
        let query = query.with_extra_columns([format!("{match_column} AS {MATCH_KEY}")]);
        let rows = self.dialect.select_many(&mut *self.store, meta, &query)?;

        let mut keys = Vec::with_capacity(rows.len());
        let mut targets = Vec::with_capacity(rows.len());
        for mut row in rows {
            keys.push(row.take(MATCH_KEY).and_then(|v| v.key()));
            targets.push(hydrate(meta.def, row)?);
        }

        if !children.is_empty() && !targets.is_empty() {
            let mut refs: Vec<&mut dyn Record> = targets.iter_mut().map(|t| t.as_mut()).collect();
            self.run(meta.def, &mut refs, children)?;
        }
        Ok(keys.into_iter().zip(targets).collect())
    }
}

fn require_column(def: &ModelDef, column: &str) -> Result<()> {
    if def.has_column(column) {
        Ok(())
    } else {
        Err(KilnError::MissingColumn {
            model: def.name.to_owned(),
            column: column.to_owned(),
        })
    }
}

/// Key of every root, plus the distinct non-zero values to query for.
fn collect_keys(roots: &[&mut dyn Record], column: &str) -> (Vec<Option<Key>>, Vec<Value>) {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    let keys = roots
        .iter()
        .map(|root| {
            let value = root.get(column)?;
            let key = value.key()?;
            if seen.insert(key.clone()) {
                values.push(value);
            }
            Some(key)
        })
        .collect();
    (keys, values)
}

fn assign_grouped(
    assoc: &AssociationDef,
    roots: &mut [&mut dyn Record],
    root_keys: Vec<Option<Key>>,
    matched: &Matched,
) -> Result<()> {
    let mut groups: HashMap<&Key, Vec<usize>> = HashMap::new();
    for (i, (key, _)) in matched.iter().enumerate() {
        if let Some(key) = key {
            groups.entry(key).or_default().push(i);
        }
    }

    for (root, key) in roots.iter_mut().zip(root_keys) {
        let members = key.as_ref().and_then(|k| groups.get(k));
        let loaded = match assoc.kind {
            AssociationKind::HasOne => Loaded::One(
                members
                    .and_then(|m| m.first())
                    .map(|&i| matched[i].1.boxed_clone()),
            ),
            _ => Loaded::Many(
                members
                    .map(|m| m.iter().map(|&i| matched[i].1.boxed_clone()).collect())
                    .unwrap_or_default(),
            ),
        };
        root.assign(assoc.field, loaded)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::preload::plan;
    use crate::testing::{Author, MemoryStore, Post, TestDialect};

    fn store() -> MemoryStore {
        let mut store = MemoryStore::default();
        store.respond(
            "posts.author_id AS __kiln_match_key",
            vec![
                MemoryStore::row(&[("id", 10.into()), ("title", "b".into()), ("author_id", 1.into()), (MATCH_KEY, 1.into())]),
                MemoryStore::row(&[("id", 11.into()), ("title", "a".into()), ("author_id", 1.into()), (MATCH_KEY, 1.into())]),
                MemoryStore::row(&[("id", 12.into()), ("title", "c".into()), ("author_id", 2.into()), (MATCH_KEY, 2.into())]),
            ],
        );
        store.respond(
            "authors.id AS __kiln_match_key",
            vec![MemoryStore::row(&[("id", 1.into()), ("name", "ann".into()), (MATCH_KEY, 1.into())])],
        );
        store
    }

    #[test]
    fn has_many_groups_by_owner_key() {
        let mut store = store();
        let dialect = TestDialect::default();
        let ctx = Context::new();
        let mut authors = vec![
            Author { id: 1, ..Default::default() },
            Author { id: 2, ..Default::default() },
            Author { id: 3, ..Default::default() },
        ];
        let forest = plan(Author::model_def(), &["posts"]).unwrap();
        let mut roots: Vec<&mut dyn Record> = authors.iter_mut().map(|a| a as &mut dyn Record).collect();
        Preloader::new(&mut store, &dialect, &ctx)
            .run(Author::model_def(), &mut roots, &forest)
            .unwrap();

        assert_eq!(store.queries.len(), 1);
        assert!(store.queries[0].0.contains("WHERE posts.author_id IN (?, ?, ?)"));
        assert_eq!(authors[0].posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(authors[1].posts.len(), 1);
        assert!(authors[2].posts.is_empty());
    }

    #[test]
    fn belongs_to_skips_null_keys() {
        let mut store = store();
        let dialect = TestDialect::default();
        let ctx = Context::new();
        let mut posts = vec![
            Post { id: 10, author_id: Some(1), ..Default::default() },
            Post { id: 13, author_id: None, ..Default::default() },
            Post { id: 14, author_id: Some(1), ..Default::default() },
        ];
        let forest = plan(Post::model_def(), &["author"]).unwrap();
        let mut roots: Vec<&mut dyn Record> = posts.iter_mut().map(|p| p as &mut dyn Record).collect();
        Preloader::new(&mut store, &dialect, &ctx)
            .run(Post::model_def(), &mut roots, &forest)
            .unwrap();

        assert_eq!(store.queries.len(), 1);
        assert_eq!(store.queries[0].1, vec![Value::Int(1)]);
        assert_eq!(posts[0].author.as_ref().map(|a| a.name.as_str()), Some("ann"));
        assert!(posts[1].author.is_none());
        assert!(posts[2].author.is_some());
    }

    #[test]
    fn no_keys_no_query() {
        let mut store = store();
        let dialect = TestDialect::default();
        let ctx = Context::new();
        let mut posts = vec![Post::default()];
        let forest = plan(Post::model_def(), &["author"]).unwrap();
        let mut roots: Vec<&mut dyn Record> = posts.iter_mut().map(|p| p as &mut dyn Record).collect();
        Preloader::new(&mut store, &dialect, &ctx)
            .run(Post::model_def(), &mut roots, &forest)
            .unwrap();
        assert!(store.queries.is_empty());
        assert!(posts[0].author.is_none());
    }
}
