//! Pre-order traversal over statements and expressions.

use crate::ast::{Block, Decl, Expr, ExprKind, File, Stmt, StmtKind};

/// Hooks return `false` to skip the children of the visited node.
pub trait Visitor<'ast> {
  fn visit_stmt(&mut self, _stmt: &'ast Stmt) -> bool {
    true
  }

  fn visit_expr(&mut self, _expr: &'ast Expr) -> bool {
    true
  }
}

/// Visits every function body and every value of a top-level `var`.
pub fn walk_file<'ast, V: Visitor<'ast>>(visitor: &mut V, file: &'ast File) {
  for decl in &file.decls {
    walk_decl(visitor, decl);
  }
}

pub fn walk_decl<'ast, V: Visitor<'ast>>(visitor: &mut V, decl: &'ast Decl) {
  match decl {
    Decl::Func(func) => {
      if let Some(body) = &func.body {
        walk_block(visitor, body);
      }
    }
    Decl::Var(specs) | Decl::Const(specs) => {
      for spec in specs {
        for value in &spec.values {
          walk_expr(visitor, value);
        }
      }
    }
    Decl::Type(_) => {}
  }
}

pub fn walk_block<'ast, V: Visitor<'ast>>(visitor: &mut V, block: &'ast Block) {
  for stmt in block {
    walk_stmt(visitor, stmt);
  }
}

fn walk_opt_stmt<'ast, V: Visitor<'ast>>(visitor: &mut V, stmt: &'ast Option<Box<Stmt>>) {
  if let Some(stmt) = stmt {
    walk_stmt(visitor, stmt);
  }
}

pub fn walk_stmt<'ast, V: Visitor<'ast>>(visitor: &mut V, stmt: &'ast Stmt) {
  if !visitor.visit_stmt(stmt) {
    return;
  }
  match &stmt.value {
    StmtKind::Decl(decl) => walk_decl(visitor, decl),
    StmtKind::Labeled { stmt, .. } => walk_stmt(visitor, stmt),
    StmtKind::Expr(expr) | StmtKind::Go(expr) | StmtKind::Defer(expr) => walk_expr(visitor, expr),
    StmtKind::Send { chan, value } => {
      walk_expr(visitor, chan);
      walk_expr(visitor, value);
    }
    StmtKind::IncDec { x, .. } => walk_expr(visitor, x),
    StmtKind::Assign { lhs, rhs, .. } => {
      lhs.iter().chain(rhs).for_each(|it| walk_expr(visitor, it));
    }
    StmtKind::Return(results) => results.iter().for_each(|it| walk_expr(visitor, it)),
    StmtKind::Block(block) => walk_block(visitor, block),
    StmtKind::If { init, cond, then, els } => {
      walk_opt_stmt(visitor, init);
      walk_expr(visitor, cond);
      walk_block(visitor, then);
      walk_opt_stmt(visitor, els);
    }
    StmtKind::Switch { init, tag, clauses } => {
      walk_opt_stmt(visitor, init);
      if let Some(tag) = tag {
        walk_expr(visitor, tag);
      }
      for clause in clauses {
        clause.list.iter().for_each(|it| walk_expr(visitor, it));
        walk_block(visitor, &clause.body);
      }
    }
    StmtKind::TypeSwitch { init, assign, clauses } => {
      walk_opt_stmt(visitor, init);
      walk_stmt(visitor, assign);
      for clause in clauses {
        walk_block(visitor, &clause.body);
      }
    }
    StmtKind::Select { clauses } => {
      for clause in clauses {
        walk_opt_stmt(visitor, &clause.comm);
        walk_block(visitor, &clause.body);
      }
    }
    StmtKind::For { init, cond, post, body } => {
      walk_opt_stmt(visitor, init);
      if let Some(cond) = cond {
        walk_expr(visitor, cond);
      }
      walk_opt_stmt(visitor, post);
      walk_block(visitor, body);
    }
    StmtKind::Range { key, value, x, body, .. } => {
      key.iter().chain(value).for_each(|it| walk_expr(visitor, it));
      walk_expr(visitor, x);
      walk_block(visitor, body);
    }
    StmtKind::Branch { .. } | StmtKind::Empty => {}
  }
}

pub fn walk_expr<'ast, V: Visitor<'ast>>(visitor: &mut V, expr: &'ast Expr) {
  if !visitor.visit_expr(expr) {
    return;
  }
  match &expr.value {
    ExprKind::Ident(_) | ExprKind::BasicLit(_) | ExprKind::Type(_) => {}
    ExprKind::CompositeLit { ty, elts } => {
      if let Some(ty) = ty {
        walk_expr(visitor, ty);
      }
      elts.iter().for_each(|it| walk_expr(visitor, it));
    }
    ExprKind::FuncLit { body, .. } => walk_block(visitor, body),
    ExprKind::Paren(x) | ExprKind::Unary { x, .. } | ExprKind::Selector { x, .. } | ExprKind::TypeAssert { x, .. } => {
      walk_expr(visitor, x)
    }
    ExprKind::Index { x, index } => {
      walk_expr(visitor, x);
      walk_expr(visitor, index);
    }
    ExprKind::Slice { x, low, high, max } => {
      walk_expr(visitor, x);
      for part in [low, high, max].into_iter().flatten() {
        walk_expr(visitor, part);
      }
    }
    ExprKind::Call { fun, args, .. } => {
      walk_expr(visitor, fun);
      args.iter().for_each(|it| walk_expr(visitor, it));
    }
    ExprKind::Binary { x, y, .. } => {
      walk_expr(visitor, x);
      walk_expr(visitor, y);
    }
    ExprKind::KeyValue { key, value } => {
      walk_expr(visitor, key);
      walk_expr(visitor, value);
    }
  }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::parse_file;

  #[derive(Default)]
  struct Calls(Vec<String>);

  impl<'ast> Visitor<'ast> for Calls {
    fn visit_expr(&mut self, expr: &'ast Expr) -> bool {
      if let ExprKind::Call { fun, .. } = &expr.value {
        if let ExprKind::Ident(name) = &fun.value {
          self.0.push(name.0.clone());
          return false;
        }
      }
      true
    }
  }

  #[test]
  fn finds_calls_in_nested_statements() {
    let file = parse_file(
      "package a\n\nvar x = f(g())\n\nfunc h() {\n  if ok {\n    for i := range xs {\n      defer k(i)\n    }\n  }\n  return m()\n}\n",
    )
    .unwrap();
    let mut calls = Calls::default();
    walk_file(&mut calls, &file);
    assert_eq!(calls.0, vec!["f", "k", "m"]);
  }
}
