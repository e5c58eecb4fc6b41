//! The Parser and codegen (spec.md §4.5): single-pass recursive descent
//! emitting `Instruction`s directly into a shared `Program` buffer. There
//! is no intermediate AST — each grammar production, as it recognizes a
//! construct, appends the bytecode for it immediately.

use nominal_runtime::{ArithOp, Handle, Heap, Instruction as I, NominalError, Program};

use crate::lexer::{Lexer, Position, Token, TokenKind};

/// Compiles `src` as a `seq` (spec.md's `program := seq`), appending to
/// `program` and returning the entry offset of the newly emitted code —
/// the index `Vm::run` should start from. A trailing `RETURN` is always
/// appended so the VM can unwind back to the caller.
pub fn compile(src: &str, heap: &mut Heap, program: &mut Program) -> Result<usize, NominalError> {
    let tokens = Lexer::new(src)
        .tokenize()
        .map_err(|(msg, pos)| NominalError::parse(format!("{pos}: {msg}")))?;
    let entry = program.len();
    let mut parser = Parser {
        tokens,
        pos: 0,
        heap,
        program,
    };
    parser.seq()?;
    parser.expect(TokenKind::Eof)?;
    parser.program.emit(I::Return);
    Ok(entry)
}

struct Parser<'h, 'p> {
    tokens: Vec<Token>,
    pos: usize,
    heap: &'h mut Heap,
    program: &'p mut Program,
}

impl<'h, 'p> Parser<'h, 'p> {
    // -- token-stream helpers ---------------------------------------------

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_kind_at(&self, delta: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + delta)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn position(&self) -> Position {
        let t = &self.tokens[self.pos];
        Position {
            line: t.line,
            column: t.column,
        }
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), NominalError> {
        if *self.peek_kind() == kind {
            self.advance();
            Ok(())
        } else {
            Err(NominalError::parse(format!(
                "{}: expected {:?}, found {:?}",
                self.position(),
                kind,
                self.peek_kind()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, NominalError> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            other => Err(NominalError::parse(format!(
                "{}: expected an identifier, found {:?}",
                self.position(),
                other
            ))),
        }
    }

    fn intern(&mut self, name: &str) -> Handle {
        self.heap.intern_string(name.as_bytes())
    }

    // -- grammar: seq / expr ----------------------------------------------

    /// `seq := expr (',' expr)*` — every sub-expression but the last is
    /// popped; the sequence's value is whatever the last one left on the
    /// stack.
    fn seq(&mut self) -> Result<(), NominalError> {
        self.expr()?;
        while *self.peek_kind() == TokenKind::Comma {
            self.advance();
            self.program.emit(I::Pop);
            self.expr()?;
        }
        Ok(())
    }

    /// `expr := assign`. Since `assign`'s grammar (`postfix (':=' expr |
    /// '=' expr)?`) only makes sense when the LHS is an identifier or a
    /// member/index chain, we resolve the ambiguity with spec.md's other
    /// precedence levels by scanning ahead for a `:=`/`=` at the same
    /// bracket depth before committing to assignment parsing; otherwise
    /// we fall through to the ordinary precedence chain.
    fn expr(&mut self) -> Result<(), NominalError> {
        if self.assignment_ahead() {
            self.assignment()
        } else {
            self.logical()
        }
    }

    /// Scans forward from the current position over what would be a
    /// `postfix` lvalue (an identifier followed by `.IDENT`/`[expr]`
    /// suffixes), without emitting anything, to see whether a `:=` or
    /// `=` immediately follows at bracket depth zero. Any other token
    /// (an operator, a comma, a closing bracket, `->`, etc.) means this
    /// is not an assignment.
    fn assignment_ahead(&self) -> bool {
        if !matches!(self.peek_kind(), TokenKind::Ident(_)) {
            return false;
        }
        let mut i = self.pos + 1;
        let mut depth: i32 = 0;
        loop {
            let kind = self
                .tokens
                .get(i)
                .map(|t| &t.kind)
                .unwrap_or(&TokenKind::Eof);
            match kind {
                TokenKind::LBracket | TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RBracket | TokenKind::RParen => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::RBrace => return false,
                TokenKind::Dot if depth == 0 => {}
                TokenKind::Ident(_) if depth == 0 => {}
                TokenKind::Declare | TokenKind::Assign if depth == 0 => return true,
                _ if depth > 0 => {}
                _ => return false,
            }
            i += 1;
        }
    }

    /// Compiles a confirmed assignment target. A bare identifier emits
    /// `LETVAR`/`SETVAR`; a chain of `.IDENT`/`[expr]` suffixes emits a
    /// `GET` for every suffix but the last, which becomes `INSERT`/`SET`.
    fn assignment(&mut self) -> Result<(), NominalError> {
        let name = self.expect_ident()?;
        let name_handle = self.intern(&name);

        if matches!(self.peek_kind(), TokenKind::Declare | TokenKind::Assign) {
            let op = self.advance();
            self.expr()?;
            match op {
                TokenKind::Declare => self.program.emit(I::LetVar(name_handle)),
                TokenKind::Assign => self.program.emit(I::SetVar(name_handle)),
                _ => unreachable!(),
            };
            return Ok(());
        }

        self.program.emit(I::GetVar(name_handle));
        loop {
            match self.peek_kind().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_ident()?;
                    let key_handle = self.intern(&member);
                    self.program.emit(I::PushString(key_handle));
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.seq()?;
                    self.expect(TokenKind::RBracket)?;
                }
                _ => {
                    return Err(NominalError::parse(format!(
                        "{}: cannot assign to this expression",
                        self.position()
                    )))
                }
            }
            match self.peek_kind().clone() {
                TokenKind::Declare => {
                    self.advance();
                    self.expr()?;
                    self.program.emit(I::Insert);
                    return Ok(());
                }
                TokenKind::Assign => {
                    self.advance();
                    self.expr()?;
                    self.program.emit(I::Set);
                    return Ok(());
                }
                _ => {
                    self.program.emit(I::Get);
                }
            }
        }
    }

    // -- grammar: precedence chain -----------------------------------------

    /// `logical := comparison (('and'|'or') comparison)*`, short-circuit
    /// via `DUP`/`JUMP_IF_*`/`POP` (spec.md §8's short-circuit property).
    fn logical(&mut self) -> Result<(), NominalError> {
        self.comparison()?;
        loop {
            match self.peek_kind() {
                TokenKind::And => {
                    self.advance();
                    self.program.emit(I::Dup);
                    let jump_site = self.program.emit(I::JumpIfFalse(usize::MAX));
                    self.program.emit(I::Pop);
                    self.comparison()?;
                    let after = self.program.len();
                    self.program.patch(jump_site, I::JumpIfFalse(after));
                }
                TokenKind::Or => {
                    self.advance();
                    self.program.emit(I::Dup);
                    let jump_site = self.program.emit(I::JumpIfTrue(usize::MAX));
                    self.program.emit(I::Pop);
                    self.comparison()?;
                    let after = self.program.len();
                    self.program.patch(jump_site, I::JumpIfTrue(after));
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn comparison(&mut self) -> Result<(), NominalError> {
        self.additive()?;
        loop {
            let instr = match self.peek_kind() {
                TokenKind::EqEq => I::Eq,
                TokenKind::NotEq => I::Neq,
                TokenKind::Lt => I::Lt,
                TokenKind::Gt => I::Gt,
                TokenKind::Le => I::Le,
                TokenKind::Ge => I::Ge,
                _ => break,
            };
            self.advance();
            self.additive()?;
            self.program.emit(instr);
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<(), NominalError> {
        self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => ArithOp::Add,
                TokenKind::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            self.multiplicative()?;
            self.program.emit(I::BinOp(op));
        }
        Ok(())
    }

    fn multiplicative(&mut self) -> Result<(), NominalError> {
        self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => ArithOp::Mul,
                TokenKind::Slash => ArithOp::Div,
                _ => break,
            };
            self.advance();
            self.unary()?;
            self.program.emit(I::BinOp(op));
        }
        Ok(())
    }

    /// `unary := ('-'|'not') unary | postfix`.
    fn unary(&mut self) -> Result<(), NominalError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                self.unary()?;
                self.program.emit(I::Neg);
                Ok(())
            }
            TokenKind::Not => {
                self.advance();
                self.unary()?;
                self.program.emit(I::Not);
                Ok(())
            }
            _ => self.postfix(),
        }
    }

    /// `postfix := primary ( '.' IDENT | '[' expr ']' | ':' args? )*`.
    /// Used whenever the result is read, never assigned to — assignment
    /// targets are parsed separately by `assignment`.
    fn postfix(&mut self) -> Result<(), NominalError> {
        self.primary()?;
        loop {
            match self.peek_kind().clone() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_ident()?;
                    let key_handle = self.intern(&member);
                    self.program.emit(I::PushString(key_handle));
                    self.program.emit(I::Get);
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.seq()?;
                    self.expect(TokenKind::RBracket)?;
                    self.program.emit(I::Get);
                }
                TokenKind::Colon => {
                    self.advance();
                    let argc = self.call_args()?;
                    self.program.emit(I::Invoke(argc));
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// `args := expr+`, whitespace-separated with no delimiter — gathers
    /// arguments greedily while the next token can start an `expr`.
    /// `-`/`not` are deliberately excluded from "can start an arg" once
    /// at least zero args remain to gather (see DESIGN.md): a bare `-`
    /// after a complete argument is read as continuing an outer additive
    /// chain (`f: (n - 1) + f: (n - 2)`), not as a fresh unary-negated
    /// argument.
    fn call_args(&mut self) -> Result<usize, NominalError> {
        let mut count = 0;
        while self.starts_bare_arg() {
            self.expr()?;
            count += 1;
        }
        Ok(count)
    }

    fn starts_bare_arg(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Ident(_)
                | TokenKind::Nil
                | TokenKind::True
                | TokenKind::False
                | TokenKind::LParen
                | TokenKind::LBrace
                | TokenKind::LBracket
        )
    }

    /// `primary := NUMBER | STRING | IDENT | 'nil'|'true'|'false' | '('
    /// seq ')' | map_literal | function_literal`.
    fn primary(&mut self) -> Result<(), NominalError> {
        match self.peek_kind().clone() {
            TokenKind::Number(n) => {
                self.advance();
                self.program.emit(I::PushNumber(n));
                Ok(())
            }
            TokenKind::String(bytes) => {
                self.advance();
                let handle = self.heap.intern_string(&bytes);
                self.program.emit(I::PushString(handle));
                Ok(())
            }
            TokenKind::Ident(name) => {
                self.advance();
                let handle = self.intern(&name);
                self.program.emit(I::GetVar(handle));
                Ok(())
            }
            TokenKind::Nil => {
                self.advance();
                self.program.emit(I::PushNil);
                Ok(())
            }
            TokenKind::True => {
                self.advance();
                self.program.emit(I::PushTrue);
                Ok(())
            }
            TokenKind::False => {
                self.advance();
                self.program.emit(I::PushFalse);
                Ok(())
            }
            TokenKind::LParen => {
                self.advance();
                self.seq()?;
                self.expect(TokenKind::RParen)?;
                Ok(())
            }
            TokenKind::LBrace => self.map_literal(),
            TokenKind::LBracket => self.function_literal(),
            other => Err(NominalError::parse(format!(
                "{}: unexpected token {:?}",
                self.position(),
                other
            ))),
        }
    }

    // -- map / function literals -------------------------------------------

    /// `map_literal := '{' (map_entry (',' map_entry)*)? '}'`.
    fn map_literal(&mut self) -> Result<(), NominalError> {
        self.expect(TokenKind::LBrace)?;
        self.program.emit(I::NewMap);
        let mut index: i64 = 0;
        if *self.peek_kind() != TokenKind::RBrace {
            loop {
                self.map_entry(index)?;
                index += 1;
                if *self.peek_kind() == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(())
    }

    /// `map_entry := expr ('->' expr | ':=' expr)?`. We push the key
    /// before the value in every form (the map is already beneath them
    /// on the stack from `NewMap`/the previous entry) so `MAP_INSERT`
    /// always pops value-then-key-then-map — simpler for a single-pass
    /// emitter than spec.md's literal "compile value, then key" order,
    /// and behaviorally identical (see DESIGN.md).
    fn map_entry(&mut self, implicit_index: i64) -> Result<(), NominalError> {
        // Shorthand `IDENT := expr`: the key is the identifier's literal
        // name, not its value as a variable reference.
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            if *self.peek_kind_at(1) == TokenKind::Declare {
                self.advance();
                self.advance();
                let key_handle = self.intern(&name);
                self.program.emit(I::PushString(key_handle));
                self.expr()?;
                self.program.emit(I::MapInsert);
                return Ok(());
            }
        }

        if self.entry_has_arrow_key() {
            self.expr()?; // key
            self.expect(TokenKind::Arrow)?;
            self.expr()?; // value
        } else {
            self.program.emit(I::PushNumber(implicit_index as f64));
            self.expr()?; // value
        }
        self.program.emit(I::MapInsert);
        Ok(())
    }

    /// Cheap bracket-depth-aware lookahead: is there a `->` before the
    /// entry's terminating `,`/`}` at depth zero? Lets us decide the key
    /// strategy without a full dry-run parse of the key expression.
    fn entry_has_arrow_key(&self) -> bool {
        let mut depth: i32 = 0;
        let mut i = self.pos;
        loop {
            let kind = self
                .tokens
                .get(i)
                .map(|t| &t.kind)
                .unwrap_or(&TokenKind::Eof);
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth -= 1,
                TokenKind::RBrace => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::Comma if depth == 0 => return false,
                TokenKind::Arrow if depth == 0 => return true,
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }

    /// `function_literal := '[' (IDENT+ '|')? seq ']'`.
    fn function_literal(&mut self) -> Result<(), NominalError> {
        self.expect(TokenKind::LBracket)?;
        let jump_site = self.program.emit(I::Jump(usize::MAX));
        let entry = self.program.len();

        let params = self.try_parse_params();
        self.seq()?;
        self.program.emit(I::Return);

        let after = self.program.len();
        self.program.patch(jump_site, I::Jump(after));
        self.program.emit(I::PushFunction { entry, params });

        self.expect(TokenKind::RBracket)?;
        Ok(())
    }

    /// Speculatively consumes `IDENT+ '|'`; if the identifiers are not
    /// followed by `|`, rewinds and reports no parameters (the tokens
    /// are the start of the body's first expression instead).
    fn try_parse_params(&mut self) -> Vec<Handle> {
        let checkpoint = self.pos;
        let mut names = Vec::new();
        while let TokenKind::Ident(name) = self.peek_kind().clone() {
            self.advance();
            names.push(name);
        }
        if !names.is_empty() && *self.peek_kind() == TokenKind::Pipe {
            self.advance();
            names.iter().map(|n| self.intern(n)).collect()
        } else {
            self.pos = checkpoint;
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nominal_runtime::Vm;

    fn run(src: &str) -> nominal_runtime::Value {
        let mut vm = Vm::new();
        let mut program = Program::new();
        let entry = compile(src, vm.heap_mut(), &mut program).unwrap();
        vm.run(&program, entry).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("2 + 3").as_f64(), Some(5.0));
        assert_eq!(run("2 * (3 + 1)").as_f64(), Some(8.0));
        assert_eq!(run("6 / 4.0").as_f64(), Some(1.5));
    }

    #[test]
    fn sequenced_declarations() {
        assert_eq!(run("a := 1, b := 2, a + b").as_f64(), Some(3.0));
    }

    #[test]
    fn map_literal_keys() {
        assert_eq!(
            run(r#"{ "zero" -> 0, "one" -> 1, two := 2 }["two"]"#).as_f64(),
            Some(2.0)
        );
        assert_eq!(run("{ 10, 20, 30 }[1]").as_f64(), Some(20.0));
    }

    #[test]
    fn recursive_fibonacci() {
        let src = "f := [ n | if: [ n < 2 ] [ n ] [ f: (n - 1) + f: (n - 2) ] ], f: 7";
        // `if` is a prelude native, not defined by the compiler itself;
        // this test supplies a minimal stand-in via the global scope.
        let mut vm = Vm::new();
        let if_name = vm.heap_mut().intern_string(b"if");
        let callback: nominal_runtime::NativeCallback =
            std::rc::Rc::new(|vm: &mut Vm, program: &Program| {
                let cond = vm.arg(0);
                let branch = if cond.is_truthy() { vm.arg(1) } else { vm.arg(2) };
                vm.invoke(program, branch, vec![])
            });
        let func_handle = vm
            .heap_mut()
            .alloc_function(nominal_runtime::Function::Native(
                nominal_runtime::NativeFunction { callback },
            ));
        nominal_runtime::scope_declare(
            vm.heap_mut(),
            vm.global_scope(),
            if_name,
            nominal_runtime::Value::function(func_handle),
        );
        let mut program = Program::new();
        let entry = compile(src, vm.heap_mut(), &mut program).unwrap();
        let result = vm.run(&program, entry).unwrap();
        assert_eq!(result.as_f64(), Some(13.0));
    }

    #[test]
    fn arity_error_on_too_many_arguments() {
        let mut vm = Vm::new();
        let mut program = Program::new();
        let entry = compile("[ a b c | a + b + c ]: 1 2 3 4", vm.heap_mut(), &mut program).unwrap();
        let err = vm.run(&program, entry).unwrap_err();
        assert_eq!(err.kind, nominal_runtime::ErrorKind::ArgumentArity);
    }

    #[test]
    fn shadowing_inner_declare_does_not_leak() {
        assert_eq!(run("x := 1, [ x := 4, x + 3 ]:, x").as_f64(), Some(1.0));
    }

    #[test]
    fn inner_set_mutates_outer() {
        assert_eq!(run("x := 1, [ x = 4, x + 3 ]:, x").as_f64(), Some(4.0));
    }

    #[test]
    fn invoking_nil_errors() {
        let mut vm = Vm::new();
        let mut program = Program::new();
        let entry = compile("(nil): ", vm.heap_mut(), &mut program).unwrap();
        let err = vm.run(&program, entry).unwrap_err();
        assert_eq!(err.kind, nominal_runtime::ErrorKind::NotInvokable);
    }
}
