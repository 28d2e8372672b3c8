//! Path tree over the variables of an open container.
//!
//! Every variable path is split on `/` into directory segments plus one
//! leaf name. Directories live in a single arena owned by the [`DirTree`];
//! lookups hand out borrowed [`Dir`] views, and a missing entry is `None`.

use crate::algs::communicator::Communicator;
use crate::container::reader::Reader;
use crate::container::var_info::VarInfo;
use std::collections::BTreeMap;
use std::fmt;

/// Arena index of a directory.
pub type DirId = usize;

/// Split `path` on `delim`, dropping empty segments.
pub fn tokenize(path: &str, delim: char) -> Vec<&str> {
    path.split(delim).filter(|s| !s.is_empty()).collect()
}

#[derive(Clone, Debug, Default)]
struct DirNode {
    name: String,
    scalars: BTreeMap<String, VarInfo>,
    arrays: BTreeMap<String, VarInfo>,
    subdirs: BTreeMap<String, DirId>,
}

/// Directory hierarchy of one container session. Read-only once built.
#[derive(Clone, Debug)]
pub struct DirTree {
    nodes: Vec<DirNode>,
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    /// A tree holding only the root directory `/`.
    pub fn new() -> Self {
        Self {
            nodes: vec![DirNode {
                name: "/".to_string(),
                ..Default::default()
            }],
        }
    }

    /// Insert every scalar and array the reader catalogued.
    pub fn build<C: Communicator>(reader: &Reader<C>) -> Self {
        let mut tree = Self::new();
        for var in reader.vars() {
            tree.insert(var.clone());
        }
        log::debug!("built directory tree with {} directories", tree.nodes.len());
        tree
    }

    /// File a variable under its leaf name, creating directories as needed.
    pub fn insert(&mut self, var: VarInfo) {
        let path = var.name().to_string();
        let segments = tokenize(&path, '/');
        let Some((leaf, dirs)) = segments.split_last() else {
            log::warn!("ignoring variable with empty path");
            return;
        };
        let id = self.create_path(dirs);
        let node = &mut self.nodes[id];
        if var.is_scalar() {
            node.scalars.insert(leaf.to_string(), var);
        } else {
            node.arrays.insert(leaf.to_string(), var);
        }
    }

    fn create_path(&mut self, segments: &[&str]) -> DirId {
        let mut id = 0;
        for seg in segments {
            id = match self.nodes[id].subdirs.get(*seg) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(DirNode {
                        name: seg.to_string(),
                        ..Default::default()
                    });
                    self.nodes[id].subdirs.insert(seg.to_string(), child);
                    child
                }
            };
        }
        id
    }

    pub fn root(&self) -> Dir<'_> {
        Dir { tree: self, id: 0 }
    }

    /// Directory reached by following `path` without its last `num_drop`
    /// segments; `None` if any segment is missing.
    pub fn get_dir(&self, path: &str, num_drop: usize) -> Option<Dir<'_>> {
        let segments = tokenize(path, '/');
        let keep = segments.len().checked_sub(num_drop)?;
        let mut dir = self.root();
        for seg in &segments[..keep] {
            dir = dir.subdir(seg)?;
        }
        Some(dir)
    }

    /// Like [`DirTree::get_dir`], creating missing directories.
    pub fn get_or_create_dir(&mut self, path: &str, num_drop: usize) -> Dir<'_> {
        let segments = tokenize(path, '/');
        let keep = segments.len().saturating_sub(num_drop);
        let id = self.create_path(&segments[..keep]);
        Dir { tree: self, id }
    }

    pub fn num_dirs(&self) -> usize {
        self.nodes.len()
    }
}

/// Borrowed view of one directory.
#[derive(Clone, Copy)]
pub struct Dir<'a> {
    tree: &'a DirTree,
    id: DirId,
}

impl<'a> Dir<'a> {
    fn node(&self) -> &'a DirNode {
        &self.tree.nodes[self.id]
    }

    pub fn id(&self) -> DirId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn scalar(&self, name: &str) -> Option<&'a VarInfo> {
        self.node().scalars.get(name)
    }

    pub fn array(&self, name: &str) -> Option<&'a VarInfo> {
        self.node().arrays.get(name)
    }

    /// Scalar or array called `name`.
    pub fn get(&self, name: &str) -> Option<&'a VarInfo> {
        self.scalar(name).or_else(|| self.array(name))
    }

    pub fn subdir(&self, name: &str) -> Option<Dir<'a>> {
        self.node().subdirs.get(name).map(|&id| Dir {
            tree: self.tree,
            id,
        })
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&'a str, &'a VarInfo)> {
        self.node().scalars.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn arrays(&self) -> impl Iterator<Item = (&'a str, &'a VarInfo)> {
        self.node().arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn subdirs(&self) -> impl Iterator<Item = Dir<'a>> + 'a {
        let tree = self.tree;
        self.node().subdirs.values().map(move |&id| Dir { tree, id })
    }

    pub fn is_empty(&self) -> bool {
        let n = self.node();
        n.scalars.is_empty() && n.arrays.is_empty() && n.subdirs.is_empty()
    }

    fn print(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        let name = self.name();
        if name.ends_with('/') {
            writeln!(f, "{pad}{name}")?;
        } else {
            writeln!(f, "{pad}{name}/")?;
        }
        for (name, _) in self.scalars() {
            writeln!(f, "{pad}  Scalar: {name}")?;
        }
        for (name, var) in self.arrays() {
            let dims = var.dims().iter().map(|d| d.to_string()).collect::<Vec<_>>();
            writeln!(f, "{pad}  Array: {name}[{}]", dims.join(","))?;
        }
        for sub in self.subdirs() {
            sub.print(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dir<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dir")
            .field("id", &self.id)
            .field("name", &self.name())
            .finish()
    }
}

impl fmt::Display for Dir<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f, 0)
    }
}

impl fmt::Display for DirTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root().print(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::types::ContainerType;

    #[test]
    fn tokenize_drops_empty_segments() {
        assert_eq!(tokenize("/a//b/c/", '/'), vec!["a", "b", "c"]);
        assert!(tokenize("", '/').is_empty());
        assert_eq!(tokenize("x", '/'), vec!["x"]);
    }

    #[test]
    fn insert_and_lookup() {
        let mut tree = DirTree::new();
        tree.insert(VarInfo::new(0, "/TimeStamp", ContainerType::Double, vec![]));
        tree.insert(VarInfo::new(
            1,
            "/grid/CellData/Pressure",
            ContainerType::Real,
            vec![100],
        ));
        let cd = tree.get_dir("/grid/CellData/Pressure", 1).unwrap();
        assert_eq!(cd.name(), "CellData");
        assert_eq!(cd.array("Pressure").unwrap().dims(), &[100]);
        assert!(cd.get("Normals").is_none());
        assert!(tree.root().scalar("TimeStamp").is_some());
        assert!(tree.get_dir("/grid/PointData", 0).is_none());
        assert!(tree.get_dir("/a", 3).is_none());
        assert_eq!(tree.get_dir("/", 0).unwrap().id(), 0);

        let made = tree.get_or_create_dir("/grid/PointData", 0).id();
        assert_eq!(tree.get_dir("grid/PointData", 0).unwrap().id(), made);

        let printed = tree.to_string();
        assert!(printed.contains("Scalar: TimeStamp"));
        assert!(printed.contains("    Array: Pressure[100]"));
        assert!(printed.contains("  grid/"));
    }
}
