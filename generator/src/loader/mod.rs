pub mod consts;
pub mod gomod;
pub mod stubs;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use swipe_parser::ast::{self, Decl, FuncDecl, InterfaceElem, Signature, TypeExpr, TypeKind, TypeSpec};
use swipe_parser::constraint;
use swipe_parser::span::Span;
use tracing::{debug, info, trace};
use walkdir::WalkDir;

use crate::error::SwipeError;
use crate::model::ModuleType;
use consts::ConstValue;
use gomod::{GoMod, ReplaceTarget};

pub struct SourceFile {
  pub path: PathBuf,
  pub ast: ast::File,
  /// Import name used in this file to import path.
  pub imports: BTreeMap<String, String>,
  /// Paths imported with `import . "path"`.
  pub dot_imports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclRef {
  pub file: usize,
  pub decl: usize,
  pub spec: usize,
}

pub struct Package {
  pub name: String,
  pub path: String,
  pub dir: PathBuf,
  pub module: Option<ModuleType>,
  /// Standard library package, stubbed or opaque.
  pub std: bool,
  /// No source is available; every named type is opaque.
  pub opaque: bool,
  pub files: Vec<SourceFile>,
  pub types: BTreeMap<String, DeclRef>,
  /// Keyed by `Name` for functions and `Recv.Name` for methods.
  pub funcs: BTreeMap<String, DeclRef>,
  pub consts: BTreeMap<String, ConstValue>,
  /// Constants grouped by their declared named type.
  pub enums: BTreeMap<String, Vec<(String, ConstValue)>>,
}

impl Package {
  pub fn new(name: &str, path: &str, dir: PathBuf) -> Self {
    Package {
      name: name.to_owned(),
      path: path.to_owned(),
      dir,
      module: None,
      std: false,
      opaque: false,
      files: Vec::new(),
      types: BTreeMap::new(),
      funcs: BTreeMap::new(),
      consts: BTreeMap::new(),
      enums: BTreeMap::new(),
    }
  }

  pub fn type_spec(&self, name: &str) -> Option<(&SourceFile, &TypeSpec)> {
    let at = self.types.get(name)?;
    let file = &self.files[at.file];
    match &file.ast.decls[at.decl] {
      Decl::Type(specs) => Some((file, &specs[at.spec])),
      _ => None,
    }
  }

  pub fn func(&self, key: &str) -> Option<(&SourceFile, &FuncDecl)> {
    let at = self.funcs.get(key)?;
    let file = &self.files[at.file];
    match &file.ast.decls[at.decl] {
      Decl::Func(func) => Some((file, func)),
      _ => None,
    }
  }

  /// Methods declared on `type_name`, in source order.
  pub fn methods_of<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = (&'a SourceFile, &'a FuncDecl)> + 'a {
    self.files.iter().flat_map(move |file| {
      file.ast.decls.iter().filter_map(move |decl| match decl {
        Decl::Func(func) if func.recv_type().is_some_and(|(recv, _)| recv == type_name) => Some((file, func)),
        _ => None,
      })
    })
  }

  fn index(&mut self) {
    for (file_index, file) in self.files.iter().enumerate() {
      for (decl_index, decl) in file.ast.decls.iter().enumerate() {
        match decl {
          Decl::Type(specs) => {
            for (spec_index, spec) in specs.iter().enumerate() {
              let at = DeclRef { file: file_index, decl: decl_index, spec: spec_index };
              self.types.insert(spec.name.value.0.clone(), at);
            }
          }
          Decl::Func(func) => {
            let key = match func.recv_type() {
              Some((recv, _)) => format!("{}.{}", recv, func.name.value.0),
              None => func.name.value.0.clone(),
            };
            self.funcs.insert(key, DeclRef { file: file_index, decl: decl_index, spec: 0 });
          }
          _ => {}
        }
      }
    }
  }
}

enum Resolved {
  Stub(Cow<'static, str>),
  Dir(PathBuf, Option<ModuleType>),
  Opaque,
}

/// Loads the packages matched by a set of patterns together with every
/// package they import, the way `go list -tags=swipe -deps` would see them.
pub struct Loader {
  work_dir: PathBuf,
  env: BTreeMap<String, String>,
  patterns: Vec<String>,
  module: GoMod,
  tags: HashSet<String>,
  packages: Vec<Package>,
  index: HashMap<String, usize>,
  roots: Vec<usize>,
  loading: HashSet<String>,
  comment_funcs: HashMap<String, Vec<String>>,
  comment_fields: HashMap<String, String>,
}

const DEFAULT_GOOS: &str = "linux";
const DEFAULT_GOARCH: &str = "amd64";

impl Loader {
  pub fn load(work_dir: &Path, env: &BTreeMap<String, String>, patterns: &[String]) -> Result<Loader, Vec<SwipeError>> {
    let module = gomod::find(work_dir).map_err(|err| vec![err])?;
    let goos = env.get("GOOS").map(|it| it.as_str()).unwrap_or(DEFAULT_GOOS);
    let goarch = env.get("GOARCH").map(|it| it.as_str()).unwrap_or(DEFAULT_GOARCH);
    info!("loading module {} ({}/{})", module.module, goos, goarch);

    let mut loader = Loader {
      work_dir: work_dir.to_path_buf(),
      env: env.clone(),
      patterns: patterns.to_vec(),
      tags: constraint::tags(goos, goarch, &["swipe"]),
      module,
      packages: Vec::new(),
      index: HashMap::new(),
      roots: Vec::new(),
      loading: HashSet::new(),
      comment_funcs: HashMap::new(),
      comment_fields: HashMap::new(),
    };

    for pattern in patterns {
      let dirs = loader.expand_pattern(pattern).map_err(|err| vec![err])?;
      for (dir, import_path, wildcard) in dirs {
        match loader.load_dir(&import_path, &dir, loader.root_module()) {
          Ok(Some(index)) => {
            if !loader.roots.contains(&index) {
              loader.roots.push(index);
            }
          }
          Ok(None) if wildcard => trace!("no buildable files in {:?}", dir),
          Ok(None) => {
            return Err(vec![SwipeError::Pattern {
              pattern: pattern.clone(),
              message: format!("no buildable Go source files in {}", dir.display()),
            }])
          }
          Err(err) => return Err(vec![err]),
        }
      }
    }

    let errs = loader.check();
    if !errs.is_empty() {
      return Err(errs);
    }
    loader.collect_comments();
    debug!("loaded {} packages ({} roots)", loader.packages.len(), loader.roots.len());
    Ok(loader)
  }

  pub fn work_dir(&self) -> &Path {
    &self.work_dir
  }

  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.env
  }

  pub fn patterns(&self) -> &[String] {
    &self.patterns
  }

  pub fn module(&self) -> &GoMod {
    &self.module
  }

  pub fn packages(&self) -> &[Package] {
    &self.packages
  }

  pub fn roots(&self) -> impl Iterator<Item = &Package> {
    self.roots.iter().map(|it| &self.packages[*it])
  }

  pub fn package(&self, path: &str) -> Option<&Package> {
    self.index.get(path).map(|it| &self.packages[*it])
  }

  /// Doc comment lines of a function (`pkg.Name`), method (`pkg.Recv.Name`)
  /// or interface method (`pkg.Iface.Name`).
  pub fn comment_func(&self, key: &str) -> &[String] {
    self.comment_funcs.get(key).map(|it| it.as_slice()).unwrap_or_default()
  }

  /// Trailing comment of a struct field (`pkg.Struct.Field`).
  pub fn comment_field(&self, key: &str) -> Option<&str> {
    self.comment_fields.get(key).map(|it| it.as_str())
  }

  fn root_module(&self) -> Option<ModuleType> {
    Some(ModuleType {
      path: self.module.module.clone(),
      version: String::new(),
      dir: self.module.dir.display().to_string(),
      external: false,
    })
  }

  fn external_module(&self, path: &str, version: &str, dir: &Path) -> Option<ModuleType> {
    Some(ModuleType {
      path: path.to_owned(),
      version: version.to_owned(),
      dir: dir.display().to_string(),
      external: path != self.module.module,
    })
  }

  /// Directories matched by a pattern, with their import paths and whether
  /// the pattern was a `...` wildcard.
  fn expand_pattern(&self, pattern: &str) -> Result<Vec<(PathBuf, String, bool)>, SwipeError> {
    let (base, wildcard) = match pattern.strip_suffix("/...") {
      Some(base) => (base, true),
      None if pattern == "..." => (".", true),
      None => (pattern, false),
    };

    let base_dir = if base.starts_with('.') || Path::new(base).is_absolute() {
      self.work_dir.join(base)
    } else if self.module.contains(base) {
      self.module.dir.join(base[self.module.module.len()..].trim_start_matches('/'))
    } else {
      return Err(SwipeError::Pattern {
        pattern: pattern.to_owned(),
        message: format!("package {} is not in the main module {}", base, self.module.module),
      });
    };
    let base_dir = normalize_path(&base_dir);
    if !base_dir.is_dir() {
      return Err(SwipeError::Pattern { pattern: pattern.to_owned(), message: "directory not found".to_owned() });
    }

    let dirs = if wildcard {
      WalkDir::new(&base_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
          if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
          }
          let name = entry.file_name().to_string_lossy();
          !(name.starts_with('.') || name.starts_with('_') || name == "testdata" || name == "vendor")
            && !entry.path().join("go.mod").is_file()
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>()
    } else {
      vec![base_dir]
    };

    dirs
      .into_iter()
      .map(|dir| {
        let relative = dir.strip_prefix(&self.module.dir).map_err(|_| SwipeError::Pattern {
          pattern: pattern.to_owned(),
          message: format!("directory {} is outside the main module", dir.display()),
        })?;
        let mut import_path = self.module.module.clone();
        for component in relative.components() {
          import_path.push('/');
          import_path.push_str(&component.as_os_str().to_string_lossy());
        }
        Ok((dir, import_path, wildcard))
      })
      .collect()
  }

  fn module_cache(&self) -> PathBuf {
    if let Some(dir) = self.env.get("GOMODCACHE").filter(|it| !it.is_empty()) {
      return PathBuf::from(dir);
    }
    if let Some(gopath) = self.env.get("GOPATH").filter(|it| !it.is_empty()) {
      if let Some(first) = std::env::split_paths(gopath).next() {
        return first.join("pkg").join("mod");
      }
    }
    let home = self.env.get("HOME").cloned().unwrap_or_default();
    PathBuf::from(home).join("go").join("pkg").join("mod")
  }

  fn resolve(&self, import_path: &str) -> Result<Resolved, String> {
    let std = stubs::is_std(import_path);
    if std {
      return Ok(match stubs::source(import_path) {
        Some(source) => Resolved::Stub(Cow::Borrowed(source)),
        None => Resolved::Opaque,
      });
    }

    if self.module.contains(import_path) {
      let rest = import_path[self.module.module.len()..].trim_start_matches('/');
      let dir = self.module.dir.join(rest);
      if !dir.is_dir() {
        if let Some(source) = crate::plugin::options_stub(import_path) {
          return Ok(Resolved::Stub(Cow::Owned(source)));
        }
      }
      return Ok(Resolved::Dir(dir, self.root_module()));
    }

    if let Some(replace) = self.module.replace_for(import_path) {
      let rest = import_path[replace.path.len()..].trim_start_matches('/');
      match &replace.target {
        ReplaceTarget::Dir(dir) => {
          let root = normalize_path(&self.module.dir.join(dir));
          return Ok(Resolved::Dir(root.join(rest), self.external_module(&replace.path, "", &root)));
        }
        ReplaceTarget::Module { path, version } => {
          let root = self.module_cache().join(format!("{}@{}", gomod::escape_path(path), version));
          if root.is_dir() {
            return Ok(Resolved::Dir(root.join(rest), self.external_module(&replace.path, version, &root)));
          }
        }
      }
    }

    let vendored = self.module.dir.join("vendor").join(import_path);
    if vendored.is_dir() {
      let module = self.module.require_for(import_path);
      let (path, version) = module.map(|it| (it.path.as_str(), it.version.as_str())).unwrap_or((import_path, ""));
      return Ok(Resolved::Dir(vendored.clone(), self.external_module(path, version, &vendored)));
    }

    if let Some(require) = self.module.require_for(import_path) {
      let root = self.module_cache().join(format!("{}@{}", gomod::escape_path(&require.path), require.version));
      let rest = import_path[require.path.len()..].trim_start_matches('/');
      if root.join(rest).is_dir() {
        return Ok(Resolved::Dir(root.join(rest), self.external_module(&require.path, &require.version, &root)));
      }
    }

    if let Some(source) = stubs::source(import_path) {
      return Ok(Resolved::Stub(Cow::Borrowed(source)));
    }
    // Options packages that were never written with `--init`.
    match crate::plugin::options_stub(import_path) {
      Some(source) => Ok(Resolved::Stub(Cow::Owned(source))),
      None => Err(format!("cannot find package {:?} (run go mod download)", import_path)),
    }
  }

  fn load_import(&mut self, import_path: &str, from: &Path, span: Span) -> Result<usize, SwipeError> {
    if let Some(index) = self.index.get(import_path) {
      return Ok(*index);
    }
    if self.loading.contains(import_path) {
      return Err(SwipeError::Load {
        path: from.to_path_buf(),
        position: span,
        message: format!("import cycle not allowed: {}", import_path),
      });
    }

    let resolved = self
      .resolve(import_path)
      .map_err(|message| SwipeError::Load { path: from.to_path_buf(), position: span, message })?;
    match resolved {
      Resolved::Stub(source) => self.load_stub(import_path, &source),
      Resolved::Opaque => {
        let name = import_path.rsplit('/').next().unwrap_or(import_path);
        let mut pkg = Package::new(name, import_path, PathBuf::new());
        pkg.std = true;
        pkg.opaque = true;
        Ok(self.push(pkg))
      }
      Resolved::Dir(dir, module) => match self.load_dir(import_path, &dir, module)? {
        Some(index) => Ok(index),
        None => Err(SwipeError::Load {
          path: from.to_path_buf(),
          position: span,
          message: format!("no buildable Go source files in {}", dir.display()),
        }),
      },
    }
  }

  fn load_stub(&mut self, import_path: &str, source: &str) -> Result<usize, SwipeError> {
    let path = PathBuf::from(format!("$stub/{}.go", import_path));
    let ast = swipe_parser::parse_file(source).map_err(|source| SwipeError::Syntax { path: path.clone(), source })?;
    let mut pkg = Package::new(&ast.package.value.0, import_path, PathBuf::new());
    pkg.std = stubs::is_std(import_path);
    let file = self.link_imports(path, ast)?;
    pkg.files.push(file);
    Ok(self.finish(pkg))
  }

  fn include_file(&self, name: &str) -> bool {
    name.ends_with(".go")
      && !name.ends_with("_test.go")
      && !name.starts_with('.')
      && !name.starts_with('_')
      && constraint::file_name_matches(name, &self.tags)
  }

  /// Loads the package in `dir`. `Ok(None)` when no file survives the
  /// build constraints.
  fn load_dir(&mut self, import_path: &str, dir: &Path, module: Option<ModuleType>) -> Result<Option<usize>, SwipeError> {
    if let Some(index) = self.index.get(import_path) {
      return Ok(Some(*index));
    }
    let entries = fs::read_dir(dir).map_err(|source| SwipeError::File { path: dir.to_path_buf(), source })?;
    let mut names = entries
      .filter_map(|entry| entry.ok())
      .filter(|entry| entry.file_type().is_ok_and(|it| it.is_file()))
      .map(|entry| entry.file_name().to_string_lossy().into_owned())
      .filter(|name| self.include_file(name))
      .collect::<Vec<_>>();
    names.sort();

    let mut parsed = Vec::new();
    for name in names {
      let path = dir.join(&name);
      let source = fs::read_to_string(&path).map_err(|source| SwipeError::File { path: path.clone(), source })?;
      let header = header_constraints(&source);
      let included =
        constraint::matches(&header, &self.tags).map_err(|source| SwipeError::Syntax { path: path.clone(), source })?;
      if !included {
        trace!("skipping {:?} by build constraints", path);
        continue;
      }
      let ast = swipe_parser::parse_file(&source).map_err(|source| SwipeError::Syntax { path: path.clone(), source })?;
      parsed.push((path, ast));
    }

    let Some((first_path, first)) = parsed.first() else {
      return Ok(None);
    };
    let name = first.package.value.0.clone();
    if let Some((path, other)) = parsed.iter().find(|(_, ast)| ast.package.value.0 != name) {
      return Err(SwipeError::Load {
        path: path.clone(),
        position: other.package.span,
        message: format!(
          "found packages {} ({}) and {} ({}) in {}",
          name,
          file_name(first_path),
          other.package.value.0,
          file_name(path),
          dir.display()
        ),
      });
    }

    debug!("loading package {} from {:?}", import_path, dir);
    self.loading.insert(import_path.to_owned());
    let mut pkg = Package::new(&name, import_path, dir.to_path_buf());
    pkg.module = module;
    for (path, ast) in parsed {
      let file = self.link_imports(path, ast)?;
      pkg.files.push(file);
    }
    self.loading.remove(import_path);
    Ok(Some(self.finish(pkg)))
  }

  fn link_imports(&mut self, path: PathBuf, ast: ast::File) -> Result<SourceFile, SwipeError> {
    let mut imports = BTreeMap::new();
    let mut dot_imports = Vec::new();
    for spec in &ast.imports {
      let import_path = spec.path.value.as_str();
      if import_path == "C" || import_path == "unsafe" {
        continue;
      }
      let index = self.load_import(import_path, &path, spec.path.span)?;
      let local = match &spec.name {
        Some(name) if name.value.0 == "_" => continue,
        Some(name) if name.value.0 == "." => {
          dot_imports.push(import_path.to_owned());
          continue;
        }
        Some(name) => name.value.0.clone(),
        None => self.packages[index].name.clone(),
      };
      imports.insert(local, import_path.to_owned());
    }
    Ok(SourceFile { path, ast, imports, dot_imports })
  }

  fn push(&mut self, pkg: Package) -> usize {
    let index = self.packages.len();
    self.index.insert(pkg.path.clone(), index);
    self.packages.push(pkg);
    index
  }

  fn finish(&mut self, mut pkg: Package) -> usize {
    pkg.index();
    let evaluated = consts::evaluate_package(&pkg, |path, name| {
      let dep = &self.packages[*self.index.get(path)?];
      dep.consts.get(name).cloned()
    });
    pkg.consts = evaluated.consts;
    pkg.enums = evaluated.enums;
    trace!("package {} has {} types, {} constants", pkg.path, pkg.types.len(), pkg.consts.len());
    self.push(pkg)
  }

  fn type_exists(&self, pkg: &Package, file: &SourceFile, qualifier: Option<&str>, name: &str) -> Result<(), String> {
    match qualifier {
      None => {
        if pkg.types.contains_key(name) || is_predeclared(name) {
          Ok(())
        } else {
          Err(format!("undefined: {}", name))
        }
      }
      Some(qualifier) => {
        let Some(path) = file.imports.get(qualifier) else {
          return Err(format!("undefined: {}", qualifier));
        };
        let dep = self.package(path).ok_or_else(|| format!("undefined: {}", qualifier))?;
        if dep.opaque || dep.types.contains_key(name) {
          Ok(())
        } else {
          Err(format!("undefined: {}.{}", qualifier, name))
        }
      }
    }
  }

  fn check_type(&self, pkg: &Package, file: &SourceFile, ty: &TypeExpr, errs: &mut Vec<SwipeError>) {
    match &ty.value {
      TypeKind::Name { pkg: qualifier, name } => {
        if let Err(message) = self.type_exists(pkg, file, qualifier.as_ref().map(|it| it.as_str()), name.as_str()) {
          errs.push(SwipeError::Load { path: file.path.clone(), position: ty.span, message });
        }
      }
      TypeKind::Pointer(elem) | TypeKind::Slice(elem) | TypeKind::Ellipsis(elem) => self.check_type(pkg, file, elem, errs),
      TypeKind::Array { elem, .. } | TypeKind::Chan { elem, .. } => self.check_type(pkg, file, elem, errs),
      TypeKind::Map { key, value } => {
        self.check_type(pkg, file, key, errs);
        self.check_type(pkg, file, value, errs);
      }
      TypeKind::Func(signature) => self.check_signature(pkg, file, signature, errs),
      TypeKind::Struct(fields) => {
        for field in fields {
          self.check_type(pkg, file, &field.ty, errs);
        }
      }
      TypeKind::Interface(elems) => {
        for elem in elems {
          match elem {
            InterfaceElem::Method { signature, .. } => self.check_signature(pkg, file, signature, errs),
            InterfaceElem::Embedded(ty) => self.check_type(pkg, file, ty, errs),
          }
        }
      }
    }
  }

  fn check_signature(&self, pkg: &Package, file: &SourceFile, signature: &Signature, errs: &mut Vec<SwipeError>) {
    for field in signature.params.iter().chain(&signature.results) {
      self.check_type(pkg, file, &field.ty, errs);
    }
  }

  /// Name resolution of every declared type and signature.
  fn check(&self) -> Vec<SwipeError> {
    let mut errs = Vec::new();
    for pkg in self.packages.iter().filter(|it| !it.opaque && !it.std) {
      for file in &pkg.files {
        for decl in &file.ast.decls {
          match decl {
            Decl::Type(specs) => {
              for spec in specs {
                self.check_type(pkg, file, &spec.ty, &mut errs);
              }
            }
            Decl::Func(func) => {
              if let Some(recv) = &func.recv {
                self.check_type(pkg, file, &recv.ty, &mut errs);
              }
              self.check_signature(pkg, file, &func.signature, &mut errs);
            }
            Decl::Const(_) | Decl::Var(_) => {}
          }
        }
      }
    }
    errs
  }

  fn collect_comments(&mut self) {
    let mut funcs = HashMap::new();
    let mut fields = HashMap::new();
    for pkg in &self.packages {
      for file in &pkg.files {
        for decl in &file.ast.decls {
          match decl {
            Decl::Func(func) => {
              let key = match func.recv_type() {
                Some((recv, _)) => format!("{}.{}.{}", pkg.path, recv, func.name.value.0),
                None => format!("{}.{}", pkg.path, func.name.value.0),
              };
              if !func.doc.is_empty() {
                funcs.insert(key, comment_lines(&func.doc));
              }
            }
            Decl::Type(specs) => {
              for spec in specs {
                let owner = format!("{}.{}", pkg.path, spec.name.value.0);
                match &spec.ty.value {
                  TypeKind::Struct(struct_fields) => {
                    for field in struct_fields.iter().filter(|it| !it.comment.is_empty()) {
                      for name in &field.names {
                        fields.insert(format!("{}.{}", owner, name.value.0), ast::comment_text(&field.comment));
                      }
                    }
                  }
                  TypeKind::Interface(elems) => {
                    for elem in elems {
                      if let InterfaceElem::Method { name, doc, comment, .. } = elem {
                        let lines = comment_lines(doc).into_iter().chain(comment_lines(comment)).collect::<Vec<_>>();
                        if !lines.is_empty() {
                          funcs.insert(format!("{}.{}", owner, name.value.0), lines);
                        }
                      }
                    }
                  }
                  _ => {}
                }
              }
            }
            _ => {}
          }
        }
      }
    }
    self.comment_funcs = funcs;
    self.comment_fields = fields;
  }
}

/// Constant lookups as seen from one source file.
pub struct FileScope<'a> {
  pub loader: &'a Loader,
  pub pkg: &'a Package,
  pub file: &'a SourceFile,
}

impl consts::ConstScope for FileScope<'_> {
  fn local(&mut self, name: &str) -> Option<ConstValue> {
    self.pkg.consts.get(name).cloned()
  }

  fn qualified(&mut self, pkg: &str, name: &str) -> Option<ConstValue> {
    let path = self.file.imports.get(pkg)?;
    self.loader.package(path)?.consts.get(name).cloned()
  }
}

fn comment_lines(comments: &[ast::CommentLit]) -> Vec<String> {
  comments.iter().map(|it| it.0.trim().to_owned()).collect()
}

fn file_name(path: &Path) -> String {
  path.file_name().map(|it| it.to_string_lossy().into_owned()).unwrap_or_default()
}

pub fn is_predeclared(name: &str) -> bool {
  crate::model::BasicKind::lookup(name).is_some() || matches!(name, "error" | "any" | "comparable")
}

/// `//go:build` and `// +build` lines above the package clause, without
/// their comment markers.
pub fn header_constraints(source: &str) -> Vec<String> {
  let mut lines = Vec::new();
  let mut in_block = false;
  for line in source.lines() {
    let line = line.trim();
    if in_block {
      if line.contains("*/") {
        in_block = false;
      }
      continue;
    }
    if line.starts_with("package ") {
      break;
    }
    if line.starts_with("/*") {
      in_block = !line.contains("*/");
      continue;
    }
    if let Some(comment) = line.strip_prefix("//") {
      if comment.starts_with("go:build") || comment.trim_start().starts_with("+build") {
        lines.push(comment.to_owned());
      }
    }
  }
  lines
}

/// Removes `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
  let mut result = PathBuf::new();
  for component in path.components() {
    match component {
      std::path::Component::CurDir => {}
      std::path::Component::ParentDir => {
        result.pop();
      }
      other => result.push(other.as_os_str()),
    }
  }
  result
}

#[cfg(test)]
mod tests {
  use std::fs;

  use test_log::test;

  use super::*;

  fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  fn env() -> BTreeMap<String, String> {
    BTreeMap::from([("GOMODCACHE".to_owned(), "/nonexistent/modcache".to_owned())])
  }

  #[test]
  fn header_constraints_stop_at_package() {
    let source = "// Copyright\n\n//go:build swipe\n// +build swipe\n\npackage app\n\n//go:build ignored\n";
    assert_eq!(header_constraints(source), vec!["go:build swipe".to_owned(), " +build swipe".to_owned()]);
  }

  #[test]
  fn loads_module_with_stdlib_imports() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/app\n\ngo 1.21\n");
    write(
      dir.path(),
      "service/service.go",
      "package service\n\nimport (\n\t\"context\"\n\t\"strings\"\n)\n\ntype Service interface {\n\t// Get returns a value.\n\tGet(ctx context.Context, id int) (string, error)\n}\n\nvar _ = strings.ToUpper\n",
    );
    write(dir.path(), "service/ignored_windows.go", "package other\n");
    write(dir.path(), "service/gen.go", "//go:build !swipe\n\npackage other\n");
    write(dir.path(), "service/service_test.go", "package other\n");

    let loader = Loader::load(dir.path(), &env(), &["./...".to_owned()]).unwrap();
    let service = loader.package("example.com/app/service").unwrap();
    assert_eq!(service.name, "service");
    assert_eq!(service.files.len(), 1);
    assert!(service.types.contains_key("Service"));
    assert!(loader.package("context").is_some_and(|it| !it.opaque));
    assert!(loader.package("strings").is_some_and(|it| it.opaque));
    assert_eq!(loader.roots().count(), 1);
    assert_eq!(loader.comment_func("example.com/app/service.Service.Get"), &["Get returns a value.".to_owned()]);
  }

  #[test]
  fn undefined_names_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/app\n");
    write(dir.path(), "app.go", "package app\n\ntype Service interface {\n\tGet() Missing\n}\n");

    let errs = Loader::load(dir.path(), &env(), &["./...".to_owned()]).err().unwrap();
    assert_eq!(errs.len(), 1);
    assert!(errs[0].to_string().ends_with("app.go:4:8: undefined: Missing"), "{}", errs[0]);
  }

  #[test]
  fn mixed_package_names_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/app\n");
    write(dir.path(), "a.go", "package app\n");
    write(dir.path(), "b.go", "package other\n");

    let errs = Loader::load(dir.path(), &env(), &[".".to_owned()]).err().unwrap();
    assert!(errs[0].to_string().contains("found packages app (a.go) and other (b.go)"), "{}", errs[0]);
  }

  #[test]
  fn missing_third_party_package_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/app\n");
    write(dir.path(), "a.go", "package app\n\nimport \"github.com/acme/missing\"\n\nvar _ = missing.X\n");

    let errs = Loader::load(dir.path(), &env(), &[".".to_owned()]).err().unwrap();
    assert!(errs[0].to_string().contains("cannot find package \"github.com/acme/missing\""), "{}", errs[0]);
  }

  #[test]
  fn uuid_falls_back_to_stub() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/app\n");
    write(dir.path(), "a.go", "package app\n\nimport \"github.com/google/uuid\"\n\ntype User struct {\n\tID uuid.UUID\n}\n");

    let loader = Loader::load(dir.path(), &env(), &[".".to_owned()]).unwrap();
    let uuid = loader.package("github.com/google/uuid").unwrap();
    assert!(!uuid.std);
    assert!(uuid.types.contains_key("UUID"));
    assert_eq!(loader.package("example.com/app").unwrap().files[0].imports["uuid"], "github.com/google/uuid");
  }
}
