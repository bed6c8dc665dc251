//! Programmatic construction of bound procedures.
//!
//! Front-end adapters and tests use [`ProcBuilder`] to produce the bound
//! IR without going through source text. Spans are synthesized from a
//! monotonically increasing cursor, so nodes built in source order get
//! spans in source order.

use crate::ast::{
    AsyncProcedure, BinaryOp, CallTarget, Expr, ExprKind, LocalDecl, Param, Place, Primitive,
    ProcBody, Stmt, StmtKind, UnaryOp,
};
use crate::{ExprArena, ExprId, LocalId, Name, Span, StmtId, StringInterner, Ty};

/// Builder for one [`AsyncProcedure`] whose nodes live in a shared arena.
pub struct ProcBuilder<'a> {
    arena: &'a mut ExprArena,
    interner: &'a StringInterner,
    name: Name,
    params: Vec<Param>,
    locals: Vec<LocalDecl>,
    result: Ty,
    cancellation: Option<u32>,
    cursor: u32,
}

impl<'a> ProcBuilder<'a> {
    pub fn new(arena: &'a mut ExprArena, interner: &'a StringInterner, name: &str) -> Self {
        ProcBuilder {
            arena,
            interner,
            name: interner.intern(name),
            params: Vec::new(),
            locals: Vec::new(),
            result: Ty::Unit,
            cancellation: None,
            cursor: 0,
        }
    }

    /// Start spans at `offset` (keeps procedures sharing an arena apart).
    #[must_use]
    pub fn at_offset(mut self, offset: u32) -> Self {
        self.cursor = offset;
        self
    }

    fn next_span(&mut self) -> Span {
        let span = Span::new(self.cursor, self.cursor + 1);
        self.cursor += 2;
        span
    }

    // Signature

    /// Declare the next parameter; returns its position.
    pub fn param(&mut self, name: &str, ty: Ty) -> u32 {
        let span = self.next_span();
        let index = crate::arena::to_u32(self.params.len(), "parameter");
        self.params.push(Param {
            name: self.interner.intern(name),
            ty,
            span,
        });
        index
    }

    /// Declare the cancellation-handle parameter.
    pub fn cancellation_param(&mut self, name: &str) -> u32 {
        let index = self.param(name, Ty::Cancellation);
        self.cancellation = Some(index);
        index
    }

    /// Mark an arbitrary parameter position as the cancellation handle.
    pub fn set_cancellation(&mut self, index: u32) {
        self.cancellation = Some(index);
    }

    /// Set the `T` of the procedure's `Deferred<T>` result.
    pub fn returns(&mut self, ty: Ty) {
        self.result = ty;
    }

    /// Declare a local; a `let` statement must still introduce it.
    pub fn local(&mut self, name: &str, ty: Ty) -> LocalId {
        let span = self.next_span();
        let id = LocalId::new(crate::arena::to_u32(self.locals.len(), "local"));
        self.locals.push(LocalDecl {
            id,
            name: self.interner.intern(name),
            ty,
            span,
        });
        id
    }

    pub fn intern(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    // Expressions

    fn leaf(&mut self, kind: ExprKind, ty: Ty) -> ExprId {
        let span = self.next_span();
        self.arena.alloc_expr(Expr::new(kind, ty, span))
    }

    fn span_of(&self, id: ExprId) -> Span {
        self.arena.expr(id).span
    }

    fn ty_of(&self, id: ExprId) -> Ty {
        self.arena.expr(id).ty.clone()
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.leaf(ExprKind::Int(value), Ty::Int)
    }

    pub fn float(&mut self, value: f64) -> ExprId {
        self.leaf(ExprKind::Float(value.to_bits()), Ty::Float)
    }

    pub fn bool(&mut self, value: bool) -> ExprId {
        self.leaf(ExprKind::Bool(value), Ty::Bool)
    }

    pub fn str(&mut self, value: &str) -> ExprId {
        let name = self.interner.intern(value);
        self.leaf(ExprKind::Str(name), Ty::Str)
    }

    pub fn unit(&mut self) -> ExprId {
        self.leaf(ExprKind::Unit, Ty::Unit)
    }

    /// Read of a local; the type comes from its declaration.
    pub fn local_ref(&mut self, local: LocalId) -> ExprId {
        let ty = self
            .locals
            .get(local.index())
            .map_or(Ty::Unit, |decl| decl.ty.clone());
        self.leaf(ExprKind::Local(local), ty)
    }

    /// Read of a parameter; the type comes from its declaration.
    pub fn param_ref(&mut self, index: u32) -> ExprId {
        let ty = self
            .params
            .get(index as usize)
            .map_or(Ty::Unit, |param| param.ty.clone());
        self.leaf(ExprKind::Param(index), ty)
    }

    pub fn field(&mut self, name: &str, ty: Ty) -> ExprId {
        let name = self.interner.intern(name);
        self.leaf(ExprKind::Field(name), ty)
    }

    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId, ty: Ty) -> ExprId {
        let span = self.span_of(left).merge(self.span_of(right));
        self.arena
            .alloc_expr(Expr::new(ExprKind::Binary { op, left, right }, ty, span))
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        let span = self.span_of(operand);
        let ty = self.ty_of(operand);
        self.arena
            .alloc_expr(Expr::new(ExprKind::Unary { op, operand }, ty, span))
    }

    fn call(&mut self, target: CallTarget, args: Vec<ExprId>, ty: Ty) -> ExprId {
        let mut span = self.next_span();
        for &arg in &args {
            span = span.merge(self.span_of(arg));
        }
        let args = self.arena.alloc_expr_list(args);
        self.arena
            .alloc_expr(Expr::new(ExprKind::Call { target, args }, ty, span))
    }

    /// Call a host function returning `ty`.
    pub fn call_host(&mut self, name: &str, args: Vec<ExprId>, ty: Ty) -> ExprId {
        let name = self.interner.intern(name);
        self.call(CallTarget::Host(name), args, ty)
    }

    /// Call another async procedure whose completion yields `result`.
    pub fn call_proc(&mut self, name: &str, args: Vec<ExprId>, result: Ty) -> ExprId {
        let name = self.interner.intern(name);
        self.call(CallTarget::Procedure(name), args, Ty::deferred(result))
    }

    /// Call a plain (non-deferred) procedure of the same owner.
    pub fn call_sync(&mut self, name: &str, args: Vec<ExprId>, ty: Ty) -> ExprId {
        let name = self.interner.intern(name);
        self.call(CallTarget::Procedure(name), args, ty)
    }

    /// Call a scheduling primitive with the binder's result type.
    pub fn primitive(&mut self, primitive: Primitive, args: Vec<ExprId>) -> ExprId {
        let ty = match primitive {
            Primitive::WhenAny => Ty::deferred(Ty::Int),
            Primitive::Delay | Primitive::DelayFrames | Primitive::Yield | Primitive::WhenAll => {
                Ty::deferred(Ty::Unit)
            }
        };
        self.call(CallTarget::Primitive(primitive), args, ty)
    }

    /// A primitive call carrying whatever static type the binder assigned.
    pub fn primitive_as(&mut self, primitive: Primitive, args: Vec<ExprId>, ty: Ty) -> ExprId {
        self.call(CallTarget::Primitive(primitive), args, ty)
    }

    /// `Delay(seconds)`
    pub fn delay(&mut self, seconds: f64) -> ExprId {
        let arg = self.float(seconds);
        self.primitive(Primitive::Delay, vec![arg])
    }

    /// `DelayFrames(frames)`
    pub fn delay_frames(&mut self, frames: i64) -> ExprId {
        let arg = self.int(frames);
        self.primitive(Primitive::DelayFrames, vec![arg])
    }

    /// `Yield()`
    pub fn yield_frame(&mut self) -> ExprId {
        self.primitive(Primitive::Yield, Vec::new())
    }

    pub fn lambda(&mut self, body: Vec<StmtId>) -> ExprId {
        let mut span = self.next_span();
        for &stmt in &body {
            span = span.merge(self.arena.stmt(stmt).span);
        }
        let body = self.arena.alloc_stmt_list(body);
        self.arena
            .alloc_expr(Expr::new(ExprKind::Lambda { body }, Ty::Closure, span))
    }

    /// `suspend <operand>`; typed as the operand's deferred output.
    pub fn suspend(&mut self, operand: ExprId) -> ExprId {
        let span = self.next_span().merge(self.span_of(operand));
        let ty = self
            .arena
            .expr(operand)
            .ty
            .deferred_output()
            .cloned()
            .unwrap_or(Ty::Unit);
        self.arena
            .alloc_expr(Expr::new(ExprKind::Suspend(operand), ty, span))
    }

    // Statements

    fn stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.arena.alloc_stmt(Stmt::new(kind, span))
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        let span = self.span_of(expr);
        self.stmt(StmtKind::Expr(expr), span)
    }

    /// `suspend <operand>;`
    pub fn suspend_stmt(&mut self, operand: ExprId) -> StmtId {
        let suspend = self.suspend(operand);
        self.expr_stmt(suspend)
    }

    /// `log("<message>");`
    pub fn log(&mut self, message: &str) -> StmtId {
        let arg = self.str(message);
        let call = self.call_host("log", vec![arg], Ty::Unit);
        self.expr_stmt(call)
    }

    pub fn let_(&mut self, local: LocalId, init: ExprId) -> StmtId {
        let span = self.next_span().merge(self.span_of(init));
        self.stmt(StmtKind::Let { local, init }, span)
    }

    pub fn let_uninit(&mut self, local: LocalId) -> StmtId {
        let span = self.next_span();
        self.stmt(
            StmtKind::Let {
                local,
                init: ExprId::INVALID,
            },
            span,
        )
    }

    pub fn assign(&mut self, target: Place, value: ExprId) -> StmtId {
        let span = self.next_span().merge(self.span_of(value));
        self.stmt(StmtKind::Assign { target, value }, span)
    }

    pub fn if_(&mut self, cond: ExprId, then_branch: Vec<StmtId>, else_branch: Vec<StmtId>) -> StmtId {
        let span = self.block_span(cond, &then_branch, &else_branch);
        let then_branch = self.arena.alloc_stmt_list(then_branch);
        let else_branch = self.arena.alloc_stmt_list(else_branch);
        self.stmt(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            span,
        )
    }

    pub fn while_(&mut self, cond: ExprId, body: Vec<StmtId>) -> StmtId {
        let span = self.block_span(cond, &body, &[]);
        let body = self.arena.alloc_stmt_list(body);
        self.stmt(StmtKind::While { cond, body }, span)
    }

    fn block_span(&self, cond: ExprId, first: &[StmtId], second: &[StmtId]) -> Span {
        first
            .iter()
            .chain(second)
            .fold(self.span_of(cond), |span, &stmt| {
                span.merge(self.arena.stmt(stmt).span)
            })
    }

    pub fn break_(&mut self) -> StmtId {
        let span = self.next_span();
        self.stmt(StmtKind::Break, span)
    }

    pub fn continue_(&mut self) -> StmtId {
        let span = self.next_span();
        self.stmt(StmtKind::Continue, span)
    }

    pub fn return_(&mut self, value: Option<ExprId>) -> StmtId {
        let mut span = self.next_span();
        if let Some(value) = value {
            span = span.merge(self.span_of(value));
        }
        self.stmt(StmtKind::Return(value.unwrap_or(ExprId::INVALID)), span)
    }

    pub fn goto(&mut self, label: &str) -> StmtId {
        let span = self.next_span();
        let label = self.interner.intern(label);
        self.stmt(StmtKind::Goto(label), span)
    }

    pub fn label(&mut self, label: &str) -> StmtId {
        let span = self.next_span();
        let label = self.interner.intern(label);
        self.stmt(StmtKind::Label(label), span)
    }

    pub fn yield_return(&mut self, value: ExprId) -> StmtId {
        let span = self.next_span().merge(self.span_of(value));
        self.stmt(StmtKind::YieldReturn(value), span)
    }

    // Finishing

    fn finish(self, body: ProcBody) -> AsyncProcedure {
        let span = Span::new(0, self.cursor);
        AsyncProcedure {
            name: self.name,
            params: self.params,
            locals: self.locals,
            result: self.result,
            cancellation: self.cancellation,
            body,
            span,
        }
    }

    /// Finish with a statement-block body.
    pub fn finish_block(self, stmts: Vec<StmtId>) -> AsyncProcedure {
        let range = self.arena.alloc_stmt_list(stmts);
        self.finish(ProcBody::Block(range))
    }

    /// Finish with an expression body.
    pub fn finish_expr(self, expr: ExprId) -> AsyncProcedure {
        self.finish(ProcBody::Expr(expr))
    }
}
