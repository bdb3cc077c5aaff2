//! 导入语句使用的模块加载器

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::Program;
use crate::error::{ZynError, ZynResult};
use crate::parser;

/// 按名称加载并解析模块
pub trait ModuleLoader {
    fn load(&mut self, name: &str) -> ZynResult<Program>;
}

/// 解析源码，语法错误聚合为一个错误
fn parse_module(source: &str) -> ZynResult<Program> {
    let (program, errors) = parser::parse(source);
    if errors.is_empty() {
        Ok(program)
    } else {
        Err(ZynError::Diagnostics(errors))
    }
}

/// 在搜索路径中依次查找 `name` 与 `name.zyn`
#[derive(Debug, Clone, Default)]
pub struct FsModuleLoader {
    search_paths: Vec<PathBuf>,
}

impl FsModuleLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let with_extension = format!("{}.zyn", name);
        self.search_paths
            .iter()
            .flat_map(|dir| [dir.join(name), dir.join(&with_extension)])
            .find(|candidate| candidate.is_file())
    }
}

impl ModuleLoader for FsModuleLoader {
    fn load(&mut self, name: &str) -> ZynResult<Program> {
        let path = self.resolve(name).ok_or_else(|| {
            ZynError::Module(format!(
                "module '{}' not found in {}",
                name,
                display_paths(&self.search_paths)
            ))
        })?;
        debug!(module = name, path = %path.display(), "reading module");
        let source = fs::read_to_string(&path)
            .map_err(|e| ZynError::Io(format!("{}: {}", path.display(), e)))?;
        parse_module(&source)
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no search paths)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 从内存中的源码加载模块
#[derive(Debug, Clone, Default)]
pub struct MemoryModuleLoader {
    sources: HashMap<String, String>,
}

impl MemoryModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }
}

impl ModuleLoader for MemoryModuleLoader {
    fn load(&mut self, name: &str) -> ZynResult<Program> {
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| ZynError::Module(format!("module '{}' not found", name)))?;
        parse_module(source)
    }
}

/// 模块文件所在目录，用作默认搜索路径
pub fn module_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryModuleLoader::new().with_module("math", "export fn one() int { return 1; }");
        let program = loader.load("math").unwrap();
        assert_eq!(program.exports.len(), 1);
        assert!(matches!(loader.load("missing"), Err(ZynError::Module(_))));
    }

    #[test]
    fn test_parse_errors_are_aggregated() {
        let mut loader = MemoryModuleLoader::new().with_module("bad", "let x = ;");
        match loader.load("bad") {
            Err(ZynError::Diagnostics(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected diagnostics, got {:?}", other.map(|p| p.statements.len())),
        }
    }

    #[test]
    fn test_fs_loader_tries_zyn_extension() {
        let dir = std::env::temp_dir().join(format!("zyn-loader-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("util.zyn"), "export let answer: int = 42;").unwrap();

        let mut loader = FsModuleLoader::new(vec![PathBuf::from("/nonexistent"), dir.clone()]);
        assert_eq!(loader.resolve("util"), Some(dir.join("util.zyn")));
        let program = loader.load("util").unwrap();
        assert!(program.find_export("answer").is_some());
        assert!(matches!(loader.load("nothing"), Err(ZynError::Module(_))));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_module_dir_defaults_to_current() {
        assert_eq!(module_dir(Path::new("main.zyn")), PathBuf::from("."));
        assert_eq!(module_dir(Path::new("src/main.zyn")), PathBuf::from("src"));
    }
}
