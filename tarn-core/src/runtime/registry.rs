//! 注册表
//!
//! 一个引擎实例拥有一个 [`Runtime`]：内置类型表 + 一把锁保护的 [`Registry`]。
//! 锁只在注册 / 查找时持有，执行用户代码期间从不持有。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tarn_config::{CompilerConfig, LimitConfig};
use tarn_log::{debug, Logger};

use super::behavior::{
    BinBehavior, FiberBehavior, FileBehavior, FuncBehavior, IntBehavior, IterBehavior,
    LabelBehavior, LambdaBehavior, ListBehavior, SocketBehavior, StrBehavior, TableBehavior,
    WStrBehavior,
};
use super::coro::Fiber;
use super::iter::io::{FileHandle, SocketHandle};
use super::iter::IterRef;
use super::spawn::ThreadHandle;
use super::{Control, Thread};
use crate::compiler::Macro;
use crate::core::error::{ErrorKind, Result, TarnError};
use crate::core::func::{Arg, Func, FuncBody, FuncImp, Safety};
use crate::core::label::{Label, Lambda};
use crate::core::sync;
use crate::core::types::{get_super, Behavior, Plain, Type, TypeRef};
use crate::core::value::{shared, Rat, Sym, Table, Val, Value};

const TARGET: &str = "tarn::vm";

/// 引擎配置：编译器 + 执行限制
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub compiler: CompilerConfig,
    pub limits: LimitConfig,
}

// ==================== 内置类型 ====================

/// 内置类型，引擎生命周期内不变
pub struct Builtins {
    pub any: TypeRef,
    pub nil: TypeRef,
    pub boolean: TypeRef,
    pub cmp: TypeRef,
    pub num: TypeRef,
    pub int: TypeRef,
    pub rat: TypeRef,
    pub character: TypeRef,
    pub wchar: TypeRef,
    pub string: TypeRef,
    pub wstring: TypeRef,
    pub symbol: TypeRef,
    pub func: TypeRef,
    pub meta: TypeRef,
    pub lambda: TypeRef,
    pub label: TypeRef,
    pub bin: TypeRef,
    pub structure: TypeRef,
    pub file: TypeRef,
    pub socket: TypeRef,
    pub fiber: TypeRef,
    pub thread: TypeRef,
    pub error: TypeRef,
    // 泛型模板
    pub seq: TypeRef,
    pub list: TypeRef,
    pub table: TypeRef,
    pub pair: TypeRef,
    pub opt: TypeRef,
    pub iter: TypeRef,
}

impl Builtins {
    pub fn nil(&self) -> Value {
        Value::new(self.nil.clone(), Val::Nil)
    }

    pub fn boolean(&self, b: bool) -> Value {
        Value::new(self.boolean.clone(), Val::Bool(b))
    }

    pub fn int(&self, n: i64) -> Value {
        Value::new(self.int.clone(), Val::I64(n))
    }

    pub fn rational(&self, r: Rat) -> Value {
        Value::new(self.rat.clone(), Val::Rat(r))
    }

    pub fn character(&self, c: char) -> Value {
        Value::new(self.character.clone(), Val::Char(c))
    }

    pub fn wchar(&self, c: u16) -> Value {
        Value::new(self.wchar.clone(), Val::WChar(c))
    }

    pub fn string(&self, s: impl Into<Arc<str>>) -> Value {
        Value::new(self.string.clone(), Val::Str(s.into()))
    }

    pub fn wstring(&self, units: impl Into<Arc<[u16]>>) -> Value {
        Value::new(self.wstring.clone(), Val::WStr(units.into()))
    }

    pub fn symbol(&self, s: impl Into<Sym>) -> Value {
        Value::new(self.symbol.clone(), Val::Sym(s.into()))
    }

    pub fn func_value(&self, name: Sym) -> Value {
        Value::new(self.func.clone(), Val::Func(name))
    }

    pub fn type_value(&self, t: &TypeRef) -> Value {
        Value::new(self.meta.clone(), Val::Type(Arc::clone(t)))
    }

    pub fn label_value(&self, l: &Arc<Label>) -> Value {
        Value::new(self.label.clone(), Val::Label(Arc::clone(l)))
    }

    pub fn lambda_value(&self, l: Arc<Lambda>) -> Value {
        Value::new(self.lambda.clone(), Val::Lambda(l))
    }

    pub fn bin_value(&self, bytes: Vec<u8>) -> Value {
        Value::new(self.bin.clone(), Val::Bin(shared(bytes)))
    }

    pub fn error_value(&self, e: TarnError) -> Value {
        Value::new(self.error.clone(), Val::Error(Arc::new(e)))
    }

    pub fn file_value(&self, f: Arc<FileHandle>) -> Value {
        Value::new(self.file.clone(), Val::File(f))
    }

    pub fn socket_value(&self, s: Arc<SocketHandle>) -> Value {
        Value::new(self.socket.clone(), Val::Socket(s))
    }

    pub fn fiber_value(&self, f: Arc<Fiber>) -> Value {
        Value::new(self.fiber.clone(), Val::Fiber(f))
    }

    pub fn thread_value(&self, t: Arc<ThreadHandle>) -> Value {
        Value::new(self.thread.clone(), Val::Thread(t))
    }
}

fn new_type(
    ids: &AtomicUsize,
    name: String,
    raw: Option<TypeRef>,
    supers: Vec<TypeRef>,
    args: Vec<TypeRef>,
    params: usize,
    behavior: Arc<dyn Behavior>,
) -> TypeRef {
    Arc::new(Type {
        id: ids.fetch_add(1, Ordering::Relaxed),
        name,
        raw,
        supers,
        args,
        params,
        behavior,
    })
}

// ==================== Registry ====================

/// 引擎范围的可变注册表
pub struct Registry {
    types: HashMap<String, TypeRef>,
    funcs: HashMap<Sym, Arc<Func>>,
    macros: HashMap<String, Arc<dyn Macro>>,
    labels: HashMap<Sym, Arc<Label>>,
    convs: HashMap<(usize, usize), Value>,
    threads: HashMap<usize, Arc<ThreadHandle>>,
    any: TypeRef,
    cmp: TypeRef,
    seq: TypeRef,
    pair: TypeRef,
}

impl Registry {
    fn add(&mut self, t: &TypeRef) -> TypeRef {
        self.types.insert(t.name.clone(), Arc::clone(t));
        Arc::clone(t)
    }

    fn simple(
        &mut self,
        ids: &AtomicUsize,
        name: &str,
        supers: &[&TypeRef],
        behavior: Arc<dyn Behavior>,
    ) -> TypeRef {
        let supers = supers.iter().map(|s| Arc::clone(s)).collect();
        let t = new_type(ids, name.to_string(), None, supers, Vec::new(), 0, behavior);
        self.add(&t)
    }

    fn template(
        &mut self,
        ids: &AtomicUsize,
        name: &str,
        params: usize,
        supers: &[&TypeRef],
        behavior: Arc<dyn Behavior>,
    ) -> TypeRef {
        let supers = supers.iter().map(|s| Arc::clone(s)).collect();
        let t = new_type(ids, name.to_string(), None, supers, Vec::new(), params, behavior);
        self.add(&t)
    }

    /// 构建内置类型图
    fn bootstrap(ids: &AtomicUsize) -> (Registry, Builtins) {
        let plain: Arc<dyn Behavior> = Arc::new(Plain);
        let any = new_type(ids, "Any".into(), None, Vec::new(), Vec::new(), 0, plain.clone());
        let cmp = new_type(ids, "Cmp".into(), None, vec![any.clone()], Vec::new(), 0, plain.clone());
        let seq = new_type(ids, "Seq".into(), None, vec![any.clone()], Vec::new(), 1, plain.clone());
        let pair = new_type(ids, "Pair".into(), None, vec![any.clone()], Vec::new(), 2, plain.clone());

        let mut reg = Registry {
            types: HashMap::new(),
            funcs: HashMap::new(),
            macros: HashMap::new(),
            labels: HashMap::new(),
            convs: HashMap::new(),
            threads: HashMap::new(),
            any: any.clone(),
            cmp: cmp.clone(),
            seq: seq.clone(),
            pair: pair.clone(),
        };
        for t in [&any, &cmp, &seq, &pair] {
            reg.add(t);
        }

        let nil = reg.simple(ids, "Nil", &[&any], plain.clone());
        let boolean = reg.simple(ids, "Bool", &[&cmp], plain.clone());
        let num = reg.simple(ids, "Num", &[&cmp], plain.clone());
        let int = reg.simple(ids, "I64", &[&num], Arc::new(IntBehavior));
        let rat = reg.simple(ids, "Rat", &[&num], plain.clone());
        let character = reg.simple(ids, "Char", &[&cmp], plain.clone());
        let wchar = reg.simple(ids, "WChar", &[&cmp], plain.clone());
        let symbol = reg.simple(ids, "Sym", &[&cmp], plain.clone());

        let list = reg.template(ids, "List", 1, &[&seq], Arc::new(ListBehavior));
        let table = reg.template(ids, "Table", 2, &[&seq], Arc::new(TableBehavior));
        let opt = reg.template(ids, "Opt", 1, &[&any], plain.clone());
        let iter = reg.template(ids, "Iter", 1, &[&seq], Arc::new(IterBehavior));

        let seq_char = reg.derive(ids, &seq, vec![character.clone()]);
        let seq_wchar = reg.derive(ids, &seq, vec![wchar.clone()]);
        let seq_int = reg.derive(ids, &seq, vec![int.clone()]);
        let string = reg.simple(ids, "Str", &[&cmp, &seq_char], Arc::new(StrBehavior));
        let wstring = reg.simple(ids, "WStr", &[&cmp, &seq_wchar], Arc::new(WStrBehavior));
        let bin = reg.simple(ids, "Bin", &[&seq_int], Arc::new(BinBehavior));

        let func = reg.simple(ids, "Func", &[&any], Arc::new(FuncBehavior));
        let meta = reg.simple(ids, "Type", &[&any], plain.clone());
        let lambda = reg.simple(ids, "Lambda", &[&any], Arc::new(LambdaBehavior));
        let label = reg.simple(ids, "Label", &[&any], Arc::new(LabelBehavior));
        let structure = reg.simple(ids, "Struct", &[&any], plain.clone());
        let file = reg.simple(ids, "File", &[&any], Arc::new(FileBehavior));
        let socket = reg.simple(ids, "Socket", &[&any], Arc::new(SocketBehavior));
        let fiber = reg.simple(ids, "Fiber", &[&any], Arc::new(FiberBehavior));
        let thread = reg.simple(ids, "Thread", &[&any], plain.clone());
        let error = reg.simple(ids, "Error", &[&any], plain);

        let builtins = Builtins {
            any,
            nil,
            boolean,
            cmp,
            num,
            int,
            rat,
            character,
            wchar,
            string,
            wstring,
            symbol,
            func,
            meta,
            lambda,
            label,
            bin,
            structure,
            file,
            socket,
            fiber,
            thread,
            error,
            seq,
            list,
            table,
            pair,
            opt,
            iter,
        };
        (reg, builtins)
    }

    pub fn find_type(&self, name: &str) -> Option<TypeRef> {
        self.types.get(name).cloned()
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    /// 泛型实例化（检查参数个数）
    pub(crate) fn instantiate(
        &mut self,
        ids: &AtomicUsize,
        template: &TypeRef,
        args: Vec<TypeRef>,
    ) -> Result<TypeRef> {
        if !template.is_template() {
            return Err(TarnError::new(
                ErrorKind::UnknownTemplate,
                format!("'{}' is not a generic template", template.name),
            ));
        }
        if args.len() > template.params {
            return Err(TarnError::new(
                ErrorKind::GenericArity,
                format!(
                    "{} takes {} type argument(s), got {}",
                    template.name,
                    template.params,
                    args.len()
                ),
            ));
        }
        Ok(self.derive(ids, template, args))
    }

    /// 按渲染名记忆化的实例化，缺省参数补 Any
    fn derive(&mut self, ids: &AtomicUsize, template: &TypeRef, mut args: Vec<TypeRef>) -> TypeRef {
        while args.len() < template.params {
            args.push(self.any.clone());
        }
        let rendered: Vec<&str> = args.iter().map(|a| a.name.as_str()).collect();
        let name = format!("{}<{}>", template.name, rendered.join(","));
        if let Some(t) = self.types.get(&name) {
            return t.clone();
        }

        let mut supers = vec![template.clone()];
        match template.name.as_str() {
            "List" | "Iter" => {
                let seq = self.seq.clone();
                supers.push(self.derive(ids, &seq, vec![args[0].clone()]));
            }
            "Table" => {
                let (seq, pair) = (self.seq.clone(), self.pair.clone());
                let entry = self.derive(ids, &pair, vec![args[0].clone(), args[1].clone()]);
                supers.push(self.derive(ids, &seq, vec![entry]));
            }
            "Pair" => {
                if args.iter().all(|a| a.isa(&self.cmp)) {
                    supers.push(self.cmp.clone());
                }
            }
            _ => {}
        }

        let t = new_type(
            ids,
            name,
            Some(template.clone()),
            supers,
            args,
            0,
            template.behavior.clone(),
        );
        self.add(&t)
    }

    pub fn find_func(&self, name: &str) -> Option<Arc<Func>> {
        self.funcs.get(name).cloned()
    }

    pub fn func_names(&self) -> Vec<Sym> {
        let mut names: Vec<Sym> = self.funcs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn find_macro(&self, name: &str) -> Option<Arc<dyn Macro>> {
        self.macros.get(name).cloned()
    }

    pub fn find_label(&self, name: &str) -> Option<Arc<Label>> {
        self.labels.get(name).cloned()
    }

    pub fn find_conv(&self, from: &TypeRef, to: &TypeRef) -> Option<Value> {
        self.convs.get(&(from.id, to.id)).cloned()
    }
}

// ==================== Runtime ====================

/// 引擎实例的共享状态，所有线程共用
pub struct Runtime {
    pub types: Arc<Builtins>,
    registry: RwLock<Registry>,
    pub config: EngineConfig,
    pub logger: Arc<Logger>,
    ids: AtomicUsize,
}

impl Runtime {
    pub fn new(config: EngineConfig, logger: Arc<Logger>) -> Arc<Runtime> {
        let ids = AtomicUsize::new(1);
        let (registry, builtins) = Registry::bootstrap(&ids);
        debug!(target: TARGET, logger, "bootstrapped {} builtin types", registry.types.len());
        Arc::new(Runtime {
            types: Arc::new(builtins),
            registry: RwLock::new(registry),
            config,
            logger,
            ids,
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Registry> {
        sync::read(&self.registry)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        sync::write(&self.registry)
    }

    /// 引擎范围唯一 ID（类型、标签、lambda、重载实现、fiber、线程共用）
    pub fn next_id(&self) -> usize {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    // ---------- 类型 ----------

    pub fn find_type(&self, name: &str) -> Option<TypeRef> {
        self.read().find_type(name)
    }

    pub fn instantiate(&self, template: &TypeRef, args: Vec<TypeRef>) -> Result<TypeRef> {
        self.write().instantiate(&self.ids, template, args)
    }

    /// 按名字实例化：`instantiate_named("List", [I64])`
    pub fn instantiate_named(&self, template: &str, args: Vec<TypeRef>) -> Result<TypeRef> {
        let raw = self.find_type(template).ok_or_else(|| {
            TarnError::new(
                ErrorKind::UnknownTemplate,
                format!("unknown generic template '{template}'"),
            )
        })?;
        self.instantiate(&raw, args)
    }

    /// 注册宿主类型
    pub fn register_type(
        &self,
        name: &str,
        supers: Vec<TypeRef>,
        behavior: Arc<dyn Behavior>,
    ) -> Result<TypeRef> {
        let mut reg = self.write();
        if reg.types.contains_key(name) {
            return Err(TarnError::new(
                ErrorKind::DuplicateRegistration,
                format!("type '{name}' already registered"),
            ));
        }
        let supers = if supers.is_empty() { vec![reg.any.clone()] } else { supers };
        let t = new_type(&self.ids, name.to_string(), None, supers, Vec::new(), 0, behavior);
        debug!(target: TARGET, self.logger, "registered type {}", name);
        Ok(reg.add(&t))
    }

    // ---------- 函数 ----------

    pub fn find_func(&self, name: &str) -> Option<Arc<Func>> {
        self.read().find_func(name)
    }

    /// 追加一个重载；整个重载集被替换，已取得的快照不受影响
    pub fn add_imp(&self, name: &str, args: Vec<Arg>, safety: Safety, body: FuncBody) -> Arc<FuncImp> {
        let name: Sym = name.into();
        let imp = Arc::new(FuncImp {
            id: self.next_id(),
            name: name.clone(),
            args,
            safety,
            body,
        });
        let mut reg = self.write();
        let next = match reg.funcs.get(&name) {
            Some(func) => func.with_imp(imp.clone()),
            None => Func::new(name.clone()).with_imp(imp.clone()),
        };
        reg.funcs.insert(name, Arc::new(next));
        debug!(target: TARGET, self.logger, "registered {:?}", imp);
        imp
    }

    /// 注册原生实现
    pub fn native<F>(&self, name: &str, args: Vec<Arg>, safety: Safety, f: F) -> Arc<FuncImp>
    where
        F: Fn(&mut Thread) -> Result<Control> + Send + Sync + 'static,
    {
        self.add_imp(name, args, safety, FuncBody::Native(Arc::new(f)))
    }

    // ---------- 宏 ----------

    pub fn register_macro(&self, name: &str, m: Arc<dyn Macro>) {
        self.write().macros.insert(name.to_string(), m);
    }

    pub fn find_macro(&self, name: &str) -> Option<Arc<dyn Macro>> {
        self.read().find_macro(name)
    }

    // ---------- 转换 ----------

    /// 注册 from → to 的隐式转换；`target` 是可调用值
    pub fn add_conv(&self, from: &TypeRef, to: &TypeRef, target: Value) {
        debug!(target: TARGET, self.logger, "registered conversion {} -> {}", from.name, to.name);
        self.write().convs.insert((from.id, to.id), target);
    }

    pub fn find_conv(&self, from: &TypeRef, to: &TypeRef) -> Option<Value> {
        self.read().find_conv(from, to)
    }

    // ---------- 标签 ----------

    pub fn find_label(&self, name: &str) -> Option<Arc<Label>> {
        self.read().find_label(name)
    }

    /// 批量注册具名标签；任何重名都使整批失败
    pub(crate) fn check_labels(&self, labels: &[Arc<Label>]) -> Result<()> {
        let reg = self.read();
        for l in labels {
            if reg.labels.contains_key(&l.name) {
                return Err(TarnError::new(
                    ErrorKind::DuplicateRegistration,
                    format!("label '{}' already defined", l.name),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn register_labels(&self, labels: Vec<Arc<Label>>) {
        let mut reg = self.write();
        for l in labels {
            reg.labels.insert(l.name.clone(), l);
        }
    }

    // ---------- 线程表 ----------

    /// 登记新线程，顺带移除已经结束但没人 join 的句柄
    pub(crate) fn add_thread(&self, handle: Arc<ThreadHandle>) {
        let mut reg = self.write();
        reg.threads.retain(|_, h| !h.is_finished());
        reg.threads.insert(handle.id, handle);
    }

    /// 移除已结束的线程句柄，返回仍在运行的数量
    ///
    /// 值里持有的句柄不受影响，之后照样可以 join。
    pub fn prune_threads(&self) -> usize {
        let mut reg = self.write();
        reg.threads.retain(|_, h| !h.is_finished());
        reg.threads.len()
    }

    pub(crate) fn take_thread(&self, id: usize) -> Option<Arc<ThreadHandle>> {
        self.write().threads.remove(&id)
    }

    pub fn thread_count(&self) -> usize {
        self.read().threads.len()
    }

    // ---------- 泛型值构造 ----------

    /// 元素类型为所有元素的最小公共父类型（空列表为 `List<Any>`）
    pub fn list_of(&self, items: Vec<Value>) -> Result<Value> {
        let any = &self.types.any;
        let elem = items
            .iter()
            .map(|v| v.ty.clone())
            .reduce(|a, b| get_super(&a, &b, any))
            .unwrap_or_else(|| any.clone());
        self.list_value(items, elem)
    }

    pub fn list_value(&self, items: Vec<Value>, elem: TypeRef) -> Result<Value> {
        let ty = self.instantiate(&self.types.list, vec![elem])?;
        Ok(Value::new(ty, Val::List(shared(items))))
    }

    pub fn iter_value(&self, iter: IterRef, elem: TypeRef) -> Result<Value> {
        let ty = self.instantiate(&self.types.iter, vec![elem])?;
        Ok(Value::new(ty, Val::Iter(iter)))
    }

    pub fn pair_value(&self, left: Value, right: Value) -> Result<Value> {
        let ty = self.instantiate(&self.types.pair, vec![left.ty.clone(), right.ty.clone()])?;
        Ok(Value::new(ty, Val::Pair(Arc::new((left, right)))))
    }

    pub fn table_value(&self, table: Table, key: TypeRef, value: TypeRef) -> Result<Value> {
        let ty = self.instantiate(&self.types.table, vec![key, value])?;
        Ok(Value::new(ty, Val::Table(shared(table))))
    }
}
