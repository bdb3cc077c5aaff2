//! 编译期作用域链
//!
//! 作用域保存在一个数组中，通过父作用域下标相连。作用域严格按栈的
//! 顺序进入和退出，所以退出时直接截断数组即可。

use std::collections::HashMap;

pub type ScopeId = usize;

#[derive(Debug)]
struct Scope<B> {
    bindings: HashMap<String, B>,
    parent: Option<ScopeId>,
}

#[derive(Debug)]
pub struct Environment<B> {
    scopes: Vec<Scope<B>>,
    current: ScopeId,
}

impl<B> Environment<B> {
    /// 创建只有全局作用域的环境
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                bindings: HashMap::new(),
                parent: None,
            }],
            current: 0,
        }
    }

    /// 进入以当前作用域为父的新作用域
    pub fn push_scope(&mut self) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            bindings: HashMap::new(),
            parent: Some(self.current),
        });
        self.current = id;
        id
    }

    /// 退出当前作用域并丢弃其中的绑定，全局作用域不会被弹出
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.scopes.truncate(self.current);
            self.current = parent;
        }
    }

    /// 在当前作用域中绑定名称，返回被替换的旧绑定
    pub fn define(&mut self, name: impl Into<String>, binding: B) -> Option<B> {
        self.scopes[self.current].bindings.insert(name.into(), binding)
    }

    /// 从内到外查找名称
    pub fn resolve(&self, name: &str) -> Option<&B> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if let Some(binding) = self.scopes[id].bindings.get(name) {
                return Some(binding);
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    /// 只在当前作用域中查找
    pub fn resolve_local(&self, name: &str) -> Option<&B> {
        self.scopes[self.current].bindings.get(name)
    }

}

impl<B> Default for Environment<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let mut env = Environment::new();
        env.define("g", 1);
        env.push_scope();
        env.define("x", 2);
        env.push_scope();
        assert_eq!(env.resolve("x"), Some(&2));
        assert_eq!(env.resolve("g"), Some(&1));
        assert_eq!(env.resolve("missing"), None);
        assert_eq!(env.resolve_local("x"), None);
    }

    #[test]
    fn test_inner_binding_shadows_without_mutating_outer() {
        let mut env = Environment::new();
        env.push_scope();
        env.define("x", "outer");
        env.push_scope();
        env.define("x", "inner");
        assert_eq!(env.resolve("x"), Some(&"inner"));
        env.pop_scope();
        assert_eq!(env.resolve("x"), Some(&"outer"));
    }

    #[test]
    fn test_redefinition_in_same_scope_replaces() {
        let mut env = Environment::new();
        assert_eq!(env.define("x", 1), None);
        assert_eq!(env.define("x", 2), Some(1));
        assert_eq!(env.resolve("x"), Some(&2));
    }

    #[test]
    fn test_bindings_vanish_when_scope_is_popped() {
        let mut env = Environment::new();
        env.push_scope();
        env.define("local", 7);
        assert_eq!(env.resolve_local("local"), Some(&7));
        env.pop_scope();
        assert!(env.resolve("local").is_none());

        // 新作用域不会看到旧作用域残留的绑定
        env.push_scope();
        assert!(env.resolve("local").is_none());
    }

    #[test]
    fn test_global_scope_is_never_popped() {
        let mut env = Environment::new();
        env.define("g", 1);
        env.pop_scope();
        assert_eq!(env.resolve_local("g"), Some(&1));
    }
}
