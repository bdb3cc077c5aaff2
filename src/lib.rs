//! ZynLang 编译器
//!
//! 源码经词法分析、Pratt 语法分析后降低为基本块形式的 IR，
//! 最终以文本 LLVM IR 输出。

pub mod error;
pub mod types;
pub mod ast;
pub mod lexer;
pub mod parser;
pub mod env;
pub mod ir;
pub mod codegen;
pub mod loader;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use codegen::CodeGenerator;
use error::{ZynError, ZynResult};
use loader::{FsModuleLoader, ModuleLoader};

/// 编译选项
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub module_name: String,
    pub target_triple: Option<String>,
    /// 导入语句的模块搜索路径
    pub search_paths: Vec<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "main".to_string(),
            target_triple: None,
            search_paths: Vec::new(),
        }
    }
}

pub struct Compiler {
    options: CompileOptions,
    loader: Option<Box<dyn ModuleLoader>>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options, loader: None }
    }

    /// 替换默认的文件系统加载器
    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// 编译源码为 IR 模块；有任何诊断信息时不返回模块
    pub fn compile_source(&mut self, source: &str) -> ZynResult<ir::Module> {
        let module_name = self.options.module_name.clone();
        info!(module = %module_name, "compiling");

        // 1. 语法分析
        let (program, errors) = parser::parse(source);
        debug!(statements = program.statements.len(), errors = errors.len(), "parsed");
        if !errors.is_empty() {
            warn!(diagnostics = errors.len(), "parsing failed");
            return Err(ZynError::Diagnostics(errors));
        }

        // 2. 代码生成
        let loader = self
            .loader
            .take()
            .unwrap_or_else(|| Box::new(FsModuleLoader::new(self.options.search_paths.clone())));
        let mut generator = CodeGenerator::new(module_name.as_str())
            .with_loader(loader)
            .with_root_module(module_name.as_str());
        if let Some(triple) = &self.options.target_triple {
            generator = generator.with_target(triple.as_str());
        }
        let result = generator.generate(&program);
        self.loader = generator.take_loader();
        result?;

        if !generator.errors().is_empty() {
            warn!(diagnostics = generator.errors().len(), "code generation failed");
        }
        generator.into_module()
    }

    pub fn compile_to_string(&mut self, source: &str) -> ZynResult<String> {
        Ok(self.compile_source(source)?.to_string())
    }

    /// 编译文件并写出 `.ll` 文本；输入文件所在目录优先加入搜索路径
    pub fn compile_file(&mut self, input: &Path, output: &Path) -> ZynResult<()> {
        let source = fs::read_to_string(input)
            .map_err(|e| ZynError::Io(format!("{}: {}", input.display(), e)))?;
        if self.loader.is_none() {
            let mut paths = vec![loader::module_dir(input)];
            paths.extend(self.options.search_paths.iter().cloned());
            self.loader = Some(Box::new(FsModuleLoader::new(paths)));
        }

        let ir = self.compile_to_string(&source)?;
        fs::write(output, ir).map_err(|e| ZynError::Io(format!("{}: {}", output.display(), e)))?;
        info!(output = %output.display(), "wrote IR");
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_to_string() {
        let mut compiler = Compiler::default();
        let ir = compiler
            .compile_to_string("fn main() int { print(\"hi\\n\"); return 0; }")
            .unwrap();
        assert!(ir.contains("define i32 @main()"), "{}", ir);
        assert!(ir.contains("declare i32 @printf(ptr, ...)"), "{}", ir);
        assert!(ir.contains("c\"hi\\0A\\00\""), "{}", ir);
    }

    #[test]
    fn test_parse_errors_stop_the_pipeline() {
        let mut compiler = Compiler::default();
        match compiler.compile_source("let x int = 1;") {
            Err(ZynError::Diagnostics(errors)) => {
                assert!(matches!(errors[0], ZynError::Parser { .. }));
            }
            other => panic!("expected diagnostics, got {:?}", other.map(|m| m.name)),
        }
    }

    #[test]
    fn test_semantic_errors_are_collected() {
        let mut compiler = Compiler::default();
        let err = compiler
            .compile_source("fn main() int { return a + b; }")
            .unwrap_err();
        assert_eq!(err.flatten().len(), 2);
    }

    #[test]
    fn test_target_triple_is_emitted() {
        let options = CompileOptions {
            target_triple: Some("x86_64-unknown-linux-gnu".to_string()),
            ..CompileOptions::default()
        };
        let ir = Compiler::new(options)
            .compile_to_string("fn main() int { return 0; }")
            .unwrap();
        assert!(ir.contains("target triple = \"x86_64-unknown-linux-gnu\""));
    }
}
