use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ast::Storage;
use crate::types::Type;

pub type ScopeId = usize;
pub type SymbolId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function { params: Vec<Type>, returns: Type },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    #[serde(flatten)]
    pub kind: SymbolKind,
    #[serde(rename = "type")]
    pub ty: Type,
    pub scope_depth: usize,
    pub line: usize,
    pub column: usize,
    pub initialized: bool,
    pub used: bool,
    /// Runtime storage name for variables and parameters.
    pub slot: String,
    pub storage: Storage,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. })
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    depth: usize,
    names: FxHashMap<String, SymbolId>,
}

/// Parent-linked scopes over an arena. Leaving a scope releases its name
/// bindings; the symbols themselves are kept as the analysis record.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    current: ScopeId,
    symbols: Vec<Symbol>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                depth: 0,
                names: FxHashMap::default(),
            }],
            current: 0,
            symbols: Vec::new(),
        }
    }

    pub fn enter(&mut self) {
        let depth = self.scopes[self.current].depth + 1;
        self.scopes.push(Scope {
            parent: Some(self.current),
            depth,
            names: FxHashMap::default(),
        });
        self.current = self.scopes.len() - 1;
    }

    pub fn exit(&mut self) {
        let scope = &mut self.scopes[self.current];
        scope.names.clear();
        if let Some(parent) = scope.parent {
            self.current = parent;
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes[self.current].depth
    }

    pub fn is_global(&self) -> bool {
        self.scopes[self.current].parent.is_none()
    }

    /// Declares in the current scope. Returns the existing symbol when the
    /// name is already taken there.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<SymbolId, SymbolId> {
        let scope = &mut self.scopes[self.current];
        if let Some(&existing) = scope.names.get(&symbol.name) {
            return Err(existing);
        }
        symbol.scope_depth = scope.depth;
        let id = self.symbols.len();
        scope.names.insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    /// Innermost visible symbol with this name.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if let Some(&symbol) = self.scopes[id].names.get(name) {
                return Some(symbol);
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    pub fn lookup_global(&self, name: &str) -> Option<SymbolId> {
        self.scopes[0].names.get(name).copied()
    }

    /// Every name visible from the current scope that satisfies `filter`,
    /// sorted so suggestion ranking is deterministic.
    pub fn visible_names(&self, filter: impl Fn(&Symbol) -> bool) -> Vec<&str> {
        let mut names = Vec::new();
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            for &symbol in self.scopes[id].names.values() {
                if filter(&self.symbols[symbol]) {
                    names.push(self.symbols[symbol].name.as_str());
                }
            }
            scope = self.scopes[id].parent;
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn into_symbols(self) -> Vec<Symbol> {
        self.symbols
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            ty: Type::Int,
            scope_depth: 0,
            line: 1,
            column: 1,
            initialized: true,
            used: false,
            slot: name.to_string(),
            storage: Storage::Global,
        }
    }

    #[test]
    fn inner_scope_shadows_and_releases() {
        let mut tree = ScopeTree::new();
        let outer = tree.declare(variable("x")).expect("declare outer");
        tree.enter();
        let inner = tree.declare(variable("x")).expect("shadowing is allowed");
        assert_eq!(tree.lookup("x"), Some(inner));
        assert_eq!(tree.symbol(inner).scope_depth, 1);
        tree.exit();
        assert_eq!(tree.lookup("x"), Some(outer));
    }

    #[test]
    fn rejects_redeclaration_in_same_scope() {
        let mut tree = ScopeTree::new();
        let first = tree.declare(variable("x")).expect("declare");
        assert_eq!(tree.declare(variable("x")), Err(first));
    }

    #[test]
    fn lists_names_along_the_chain() {
        let mut tree = ScopeTree::new();
        tree.declare(variable("total")).expect("declare");
        tree.enter();
        tree.declare(variable("count")).expect("declare");
        assert_eq!(tree.visible_names(|_| true), vec!["count", "total"]);
        tree.exit();
        assert_eq!(tree.visible_names(|_| true), vec!["total"]);
    }
}
