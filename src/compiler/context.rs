//! Build context: runs setup, analyze and generate over every shader stage,
//! owns the per-stage flow buffers, the cache-key tables and the declarations
//! (uniforms, textures, attributes, varyings, functions) the backend needs.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::compiler::node_compiler;
use crate::compiler::types::{ShaderType, StructDecl};
use crate::compiler::utils::sanitize_wgsl_ident;
use crate::compiler::wgsl::{FunctionSource, ShaderBackend};
use crate::error::{CompileError, ConfigurationWarning, Result};
use crate::graph::{Builtin, Node, NodeGraph, NodeId, NodeKind, UniformGroup};
use crate::options::{CompilerOptions, DedupePolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    Setup,
    Analyze,
    Generate,
}

/// Root node per shader stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageRoots {
    /// Clip-space position (`vec4`).
    pub vertex: Option<NodeId>,
    /// Output color (`vec4`).
    pub fragment: Option<NodeId>,
    pub compute: Option<NodeId>,
}

impl StageRoots {
    pub fn render(vertex: NodeId, fragment: NodeId) -> Self {
        Self {
            vertex: Some(vertex),
            fragment: Some(fragment),
            compute: None,
        }
    }

    pub fn compute(root: NodeId) -> Self {
        Self {
            compute: Some(root),
            ..Self::default()
        }
    }

    fn stages(&self) -> Vec<(ShaderStage, NodeId)> {
        [
            (ShaderStage::Vertex, self.vertex),
            (ShaderStage::Fragment, self.fragment),
            (ShaderStage::Compute, self.compute),
        ]
        .into_iter()
        .filter_map(|(stage, root)| root.map(|r| (stage, r)))
        .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformDecl {
    /// Binding variable name in the generated source.
    pub name: String,
    /// Name given on the uniform node.
    pub source_name: String,
    pub ty: ShaderType,
    pub group: UniformGroup,
    pub binding: u32,
    /// Canonical node the uniform was registered for.
    pub node: NodeId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDecl {
    pub name: String,
    pub texture: String,
    pub sampler: String,
    /// Texture binding; the sampler sits at `binding + 1`.
    pub binding: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub ty: ShaderType,
    pub location: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaryingDecl {
    pub name: String,
    pub ty: ShaderType,
    pub location: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub ty: ShaderType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCode {
    pub name: String,
    pub code: String,
}

/// Generated code and used declarations of one stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageCode {
    pub uniforms: Vec<UniformDecl>,
    pub textures: Vec<TextureDecl>,
    pub builtins: BTreeSet<Builtin>,
    pub functions: Vec<String>,
    pub vars: Vec<VarDecl>,
    pub flow: String,
    /// Value of the stage root; `None` for compute.
    pub result: Option<String>,
}

/// Everything the backend needs to assemble source text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledProgram {
    pub vertex: Option<StageCode>,
    pub fragment: Option<StageCode>,
    pub compute: Option<StageCode>,
    pub uniforms: Vec<UniformDecl>,
    pub textures: Vec<TextureDecl>,
    pub attributes: Vec<AttributeDecl>,
    pub varyings: Vec<VaryingDecl>,
    pub functions: Vec<FunctionCode>,
    pub structs: Vec<StructDecl>,
    pub warnings: Vec<ConfigurationWarning>,
}

impl CompiledProgram {
    pub fn stage(&self, stage: ShaderStage) -> Option<&StageCode> {
        match stage {
            ShaderStage::Vertex => self.vertex.as_ref(),
            ShaderStage::Fragment => self.fragment.as_ref(),
            ShaderStage::Compute => self.compute.as_ref(),
        }
    }
}

/// Uniform binding names handed out by one compiler. Lives as long as its
/// `ShaderCompiler`, so materials built by the same compiler agree on names.
#[derive(Clone, Debug, Default)]
pub struct UniformRegistry {
    names: HashMap<String, String>,
    taken: HashSet<String>,
}

impl UniformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding name for the uniform identified by `key`.
    pub fn name_for(&mut self, key: &str, name: &str) -> String {
        if let Some(existing) = self.names.get(key) {
            return existing.clone();
        }
        let base = format!("u_{}", sanitize_wgsl_ident(name));
        let mut candidate = base.clone();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        self.names.insert(key.to_string(), candidate.clone());
        candidate
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Clone, Debug)]
enum VaryingSource {
    Attribute { name: String, ty: ShaderType },
    Node(NodeId),
}

#[derive(Clone, Debug)]
struct VaryingEntry {
    decl: VaryingDecl,
    source: VaryingSource,
}

#[derive(Clone, Debug)]
struct Cached {
    snippet: String,
    block: usize,
}

#[derive(Debug, Default)]
struct FlowFrame {
    block: usize,
    code: String,
}

/// One function body (the entry point or a generated helper).
#[derive(Debug, Default)]
struct Scope {
    function: Option<NodeId>,
    params: Vec<String>,
    vars: Vec<VarDecl>,
    names: HashSet<String>,
    properties: HashMap<String, (String, ShaderType)>,
    cache: HashMap<NodeId, Cached>,
    root: FlowFrame,
    blocks: Vec<FlowFrame>,
}

impl Scope {
    fn frame_mut(&mut self) -> &mut FlowFrame {
        self.blocks.last_mut().unwrap_or(&mut self.root)
    }

    fn block_open(&self, block: usize) -> bool {
        self.root.block == block || self.blocks.iter().any(|f| f.block == block)
    }

    fn claim(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.names.contains(&candidate) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.names.insert(candidate.clone());
        candidate
    }
}

#[derive(Debug, Default)]
struct StageState {
    main: Scope,
    functions: Vec<Scope>,
    var_counter: usize,
    uniforms: Vec<usize>,
    textures: Vec<usize>,
    builtins: BTreeSet<Builtin>,
    function_names: Vec<String>,
    result: Option<String>,
}

impl StageState {
    fn scope(&self) -> &Scope {
        self.functions.last().unwrap_or(&self.main)
    }

    fn scope_mut(&mut self) -> &mut Scope {
        self.functions.last_mut().unwrap_or(&mut self.main)
    }
}

type FunctionKey = (NodeId, Vec<ShaderType>, ShaderStage);

/// Per-compilation state. Created for one build and discarded afterwards.
pub struct BuildContext<'a> {
    graph: &'a NodeGraph,
    options: &'a CompilerOptions,
    backend: &'a dyn ShaderBackend,
    registry: &'a mut UniformRegistry,
    build_stage: BuildStage,
    stage: ShaderStage,

    keys: HashMap<NodeId, String>,
    key_stack: Vec<NodeId>,
    canonical: HashMap<String, NodeId>,

    setup_visited: HashSet<(ShaderStage, NodeId)>,
    usage: HashMap<(ShaderStage, NodeId), u32>,
    analyzed_functions: HashSet<(ShaderStage, NodeId, usize)>,
    statement_memo: HashMap<NodeId, bool>,

    types: HashMap<(NodeId, Option<usize>), ShaderType>,
    resolving: Vec<NodeId>,
    build_chain: Vec<NodeId>,

    signatures: Vec<(NodeId, Vec<ShaderType>)>,
    frames: Vec<usize>,
    resolved_calls: HashMap<(NodeId, Option<usize>), NodeId>,

    uniforms: Vec<UniformDecl>,
    uniform_index: HashMap<String, usize>,
    textures: Vec<TextureDecl>,
    texture_index: HashMap<String, usize>,
    attributes: Vec<AttributeDecl>,
    varyings: Vec<VaryingEntry>,
    varying_index: HashMap<String, usize>,
    functions: Vec<FunctionCode>,
    function_index: HashMap<FunctionKey, String>,
    functions_in_progress: HashSet<FunctionKey>,
    function_names: HashSet<String>,
    loop_vars: HashMap<NodeId, (String, ShaderType)>,
    loop_depth: usize,

    stages: BTreeMap<ShaderStage, StageState>,
    next_block: usize,
    vertex_done: bool,
    warnings: Vec<ConfigurationWarning>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        graph: &'a NodeGraph,
        options: &'a CompilerOptions,
        backend: &'a dyn ShaderBackend,
        registry: &'a mut UniformRegistry,
    ) -> Self {
        Self {
            graph,
            options,
            backend,
            registry,
            build_stage: BuildStage::Setup,
            stage: ShaderStage::Vertex,
            keys: HashMap::new(),
            key_stack: Vec::new(),
            canonical: HashMap::new(),
            setup_visited: HashSet::new(),
            usage: HashMap::new(),
            analyzed_functions: HashSet::new(),
            statement_memo: HashMap::new(),
            types: HashMap::new(),
            resolving: Vec::new(),
            build_chain: Vec::new(),
            signatures: Vec::new(),
            frames: Vec::new(),
            resolved_calls: HashMap::new(),
            uniforms: Vec::new(),
            uniform_index: HashMap::new(),
            textures: Vec::new(),
            texture_index: HashMap::new(),
            attributes: Vec::new(),
            varyings: Vec::new(),
            varying_index: HashMap::new(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            functions_in_progress: HashSet::new(),
            function_names: HashSet::new(),
            loop_vars: HashMap::new(),
            loop_depth: 0,
            stages: BTreeMap::new(),
            next_block: 1,
            vertex_done: false,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<ConfigurationWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Run every phase over every stage and collect the generated code.
    pub fn compile(mut self, roots: &StageRoots) -> Result<CompiledProgram> {
        let stages = roots.stages();
        for (stage, root) in &stages {
            if self.graph.get(*root).is_none() {
                return Err(CompileError::type_resolution(format!(
                    "{} root refers to unknown node {root}",
                    stage.name()
                )));
            }
        }
        if roots.fragment.is_some() && roots.vertex.is_none() {
            return Err(CompileError::unsupported(
                "a fragment stage needs a vertex stage to feed it",
            ));
        }

        self.build_stage = BuildStage::Setup;
        for (stage, root) in &stages {
            debug!(stage = stage.name(), "setup");
            self.stage = *stage;
            self.setup_node(*root)?;
        }

        self.build_stage = BuildStage::Analyze;
        for (stage, root) in &stages {
            debug!(stage = stage.name(), "analyze");
            self.stage = *stage;
            self.analyze_node(*root)?;
        }
        self.stage = ShaderStage::Vertex;
        for source in self.varying_sources() {
            self.analyze_node(source)?;
        }

        self.build_stage = BuildStage::Generate;
        for (stage, root) in &stages {
            debug!(stage = stage.name(), "generate");
            self.stage = *stage;
            self.stages.entry(*stage).or_default();
            let result = match stage {
                ShaderStage::Compute => {
                    self.build_statement(*root)?;
                    None
                }
                _ => Some(self.build(*root, Some(ShaderType::VEC4))?),
            };
            if *stage == ShaderStage::Vertex {
                self.flush_varyings()?;
                self.vertex_done = true;
            }
            self.state_mut().result = result;
        }

        Ok(self.finish())
    }

    fn finish(mut self) -> CompiledProgram {
        let mut program = CompiledProgram {
            uniforms: self.uniforms.clone(),
            textures: self.textures.clone(),
            attributes: self.attributes.clone(),
            varyings: self.varyings.iter().map(|v| v.decl.clone()).collect(),
            functions: std::mem::take(&mut self.functions),
            structs: self.graph.structs().to_vec(),
            warnings: std::mem::take(&mut self.warnings),
            ..CompiledProgram::default()
        };
        for (stage, state) in std::mem::take(&mut self.stages) {
            let code = StageCode {
                uniforms: state
                    .uniforms
                    .iter()
                    .filter_map(|i| self.uniforms.get(*i).cloned())
                    .collect(),
                textures: state
                    .textures
                    .iter()
                    .filter_map(|i| self.textures.get(*i).cloned())
                    .collect(),
                builtins: state.builtins,
                functions: state.function_names,
                vars: state.main.vars,
                flow: state.main.root.code,
                result: state.result,
            };
            match stage {
                ShaderStage::Vertex => program.vertex = Some(code),
                ShaderStage::Fragment => program.fragment = Some(code),
                ShaderStage::Compute => program.compute = Some(code),
            }
        }
        program
    }

    // ---- accessors -------------------------------------------------------

    pub fn graph(&self) -> &'a NodeGraph {
        self.graph
    }

    pub fn options(&self) -> &'a CompilerOptions {
        self.options
    }

    pub fn backend(&self) -> &'a dyn ShaderBackend {
        self.backend
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn build_stage(&self) -> BuildStage {
        self.build_stage
    }

    pub fn node(&self, id: NodeId) -> &'a Node {
        self.graph().node(id)
    }

    pub fn label(&self, id: NodeId) -> String {
        self.graph().node(id).display_name()
    }

    pub fn warn(&mut self, warning: ConfigurationWarning) {
        tracing::warn!(slot = %warning.slot, "{}", warning.message);
        self.warnings.push(warning);
    }

    fn state_mut(&mut self) -> &mut StageState {
        self.stages.entry(self.stage).or_default()
    }

    fn scope(&self) -> Option<&Scope> {
        self.stages.get(&self.stage).map(StageState::scope)
    }

    fn scope_mut(&mut self) -> &mut Scope {
        self.state_mut().scope_mut()
    }

    fn cycle_error(&self, id: NodeId, stack: &[NodeId]) -> CompileError {
        let start = stack.iter().position(|n| *n == id).unwrap_or(0);
        let mut chain: Vec<String> = stack[start..].iter().map(|n| self.label(*n)).collect();
        chain.push(self.label(id));
        CompileError::Cycle {
            node: self.label(id),
            chain,
        }
    }

    // ---- cache keys ------------------------------------------------------

    fn sharing(&self, node: &Node) -> DedupePolicy {
        if node.kind.requires_identity() {
            DedupePolicy::Identity
        } else {
            node.sharing.unwrap_or(self.options.dedupe)
        }
    }

    /// Content- or identity-derived key; equal keys mean interchangeable nodes.
    pub fn cache_key(&mut self, id: NodeId) -> Result<String> {
        if let Some(key) = self.keys.get(&id) {
            return Ok(key.clone());
        }
        if self.key_stack.contains(&id) {
            return Err(self.cycle_error(id, &self.key_stack));
        }
        let node = self.graph().node(id);
        let key = match self.sharing(node) {
            DedupePolicy::Identity => format!("#{}", node.uuid),
            DedupePolicy::Content => {
                self.key_stack.push(id);
                let children: Result<Vec<String>> = node
                    .kind
                    .children()
                    .into_iter()
                    .map(|child| self.cache_key(child))
                    .collect();
                self.key_stack.pop();
                let mut hasher = DefaultHasher::new();
                node.kind.tag().hash(&mut hasher);
                node.kind.params_key().hash(&mut hasher);
                node.declared_type.map(|t| t.name()).hash(&mut hasher);
                children?.hash(&mut hasher);
                format!("{}:{:016x}", node.kind.tag(), hasher.finish())
            }
        };
        self.keys.insert(id, key.clone());
        Ok(key)
    }

    /// The node registered under `id`'s cache key.
    pub fn canonical(&mut self, id: NodeId) -> Result<NodeId> {
        let key = self.cache_key(id)?;
        Ok(*self.canonical.entry(key).or_insert(id))
    }

    // ---- setup -----------------------------------------------------------

    pub fn setup_node(&mut self, id: NodeId) -> Result<()> {
        let id = self.canonical(id)?;
        if self.build_chain.contains(&id) {
            return Err(self.cycle_error(id, &self.build_chain));
        }
        if !self.setup_visited.insert((self.stage, id)) {
            return Ok(());
        }
        self.build_chain.push(id);
        let result = node_compiler::setup(self, id);
        self.build_chain.pop();
        result.map_err(|e| e.at_node(&self.label(id)))
    }

    /// Set up `id` as if it were reached from another stage.
    pub fn setup_in_stage(&mut self, stage: ShaderStage, id: NodeId) -> Result<()> {
        let saved = std::mem::replace(&mut self.stage, stage);
        let result = self.setup_node(id);
        self.stage = saved;
        result
    }

    // ---- analyze ---------------------------------------------------------

    pub fn analyze_node(&mut self, id: NodeId) -> Result<()> {
        let id = self.canonical(id)?;
        let count = self.usage.entry((self.stage, id)).or_insert(0);
        *count += 1;
        if *count > 1 {
            return Ok(());
        }
        node_compiler::analyze(self, id)
    }

    /// Analyze a function body once per stage and signature.
    pub fn analyze_function(&mut self, function: NodeId, signature: usize, body: NodeId) -> Result<()> {
        if !self
            .analyzed_functions
            .insert((self.stage, function, signature))
        {
            return Ok(());
        }
        self.with_signature(signature, |ctx| ctx.analyze_node(body))
    }

    pub fn usage_count(&self, id: NodeId) -> u32 {
        self.usage.get(&(self.stage, id)).copied().unwrap_or(0)
    }

    fn varying_sources(&self) -> Vec<NodeId> {
        self.varyings
            .iter()
            .filter_map(|v| match v.source {
                VaryingSource::Node(id) => Some(id),
                VaryingSource::Attribute { .. } => None,
            })
            .collect()
    }

    // ---- types -----------------------------------------------------------

    /// Declared type if set, otherwise the inferred one.
    pub fn node_type(&mut self, id: NodeId) -> Result<ShaderType> {
        let id = self.canonical(id)?;
        match self.graph().node(id).declared_type {
            Some(ty) => Ok(ty),
            None => self.inferred_type(id),
        }
    }

    pub fn inferred_type(&mut self, id: NodeId) -> Result<ShaderType> {
        let key = (id, self.frames.last().copied());
        if let Some(ty) = self.types.get(&key) {
            return Ok(*ty);
        }
        if self.resolving.contains(&id) {
            return Err(self.cycle_error(id, &self.resolving));
        }
        self.resolving.push(id);
        let result = node_compiler::resolve_type(self, id);
        self.resolving.pop();
        let ty = result.map_err(|e| e.at_node(&self.label(id)))?;
        self.types.insert(key, ty);
        Ok(ty)
    }

    /// Whether building `id` emits statements (or is itself a statement).
    pub fn contains_statement(&mut self, id: NodeId) -> Result<bool> {
        let id = self.canonical(id)?;
        if let Some(v) = self.statement_memo.get(&id) {
            return Ok(*v);
        }
        // provisional entry ends recursion on malformed graphs
        self.statement_memo.insert(id, false);
        let kind = &self.graph().node(id).kind;
        let mut result = kind.is_statement()
            || matches!(kind, NodeKind::Stack { nodes, .. } if !nodes.is_empty());
        if !result && !matches!(kind, NodeKind::Function { .. } | NodeKind::Overload { .. }) {
            result = self.node_type(id)? == ShaderType::Void;
            for child in kind.children() {
                if result {
                    break;
                }
                result = self.contains_statement(child)?;
            }
        }
        self.statement_memo.insert(id, result);
        Ok(result)
    }

    // ---- generate --------------------------------------------------------

    /// Build `id` and return its snippet, converted to `expected` when given.
    pub fn build(&mut self, id: NodeId, expected: Option<ShaderType>) -> Result<String> {
        let id = self.canonical(id)?;
        if self.build_chain.contains(&id) {
            return Err(self.cycle_error(id, &self.build_chain));
        }
        let ty = self.node_type(id)?;

        let snippet = match self.cached(id) {
            Some(snippet) => {
                trace!(node = %self.label(id), "cache hit");
                snippet
            }
            None => {
                self.build_chain.push(id);
                let result = self.generate_node(id, ty);
                self.build_chain.pop();
                let snippet = result.map_err(|e| {
                    e.at_node(&self.label(id)).with_backend(self.backend.name())
                })?;
                self.store(id, snippet.clone());
                snippet
            }
        };

        match expected {
            Some(to) if to != ty && ty != ShaderType::Void => {
                crate::compiler::utils::convert_snippet(&snippet, ty, to)
                    .map_err(|e| e.at_node(&self.label(id)))
            }
            _ => Ok(snippet),
        }
    }

    /// Build `id` and force it to `to`, narrowing when needed. For reads the
    /// compiler itself decides to truncate (a shift count, truthiness, the
    /// rgb of a color); author-facing conversions go through [`Self::build`].
    pub fn build_coerced(&mut self, id: NodeId, to: ShaderType) -> Result<String> {
        let id = self.canonical(id)?;
        let snippet = self.build(id, None)?;
        let ty = self.node_type(id)?;
        crate::compiler::utils::coerce_snippet(&snippet, ty, to).map_err(|e| e.at_node(&self.label(id)))
    }

    fn generate_node(&mut self, id: NodeId, ty: ShaderType) -> Result<String> {
        let inferred = self.inferred_type(id)?;
        let mut snippet = node_compiler::generate(self, id)?;
        if ty != inferred && inferred != ShaderType::Void {
            snippet = crate::compiler::utils::convert_snippet(&snippet, inferred, ty)?;
        }
        let hoist = self.options.hoist_shared
            && ty != ShaderType::Void
            && self.usage_count(id) > 1
            && node_compiler::is_hoistable(&self.graph().node(id).kind)
            && !node_compiler::input_nodes::is_identifier(&snippet);
        if hoist {
            let name = self.declare_var(ty, "nodeVar")?;
            self.add_line(&format!("{name} = {snippet};"));
            return Ok(name);
        }
        Ok(snippet)
    }

    /// Build `id` for its side effects; values in statement position are
    /// discarded with a phony assignment.
    pub fn build_statement(&mut self, id: NodeId) -> Result<()> {
        let ty = self.node_type(id)?;
        let snippet = self.build(id, None)?;
        if snippet.is_empty() {
            return Ok(());
        }
        if ty == ShaderType::Void {
            self.add_line(&format!("{snippet};"));
        } else if !node_compiler::input_nodes::is_identifier(&snippet) {
            self.add_line(&format!("_ = {snippet};"));
        }
        Ok(())
    }

    fn cached(&self, id: NodeId) -> Option<String> {
        let scope = self.scope()?;
        let entry = scope.cache.get(&id)?;
        scope
            .block_open(entry.block)
            .then(|| entry.snippet.clone())
    }

    fn store(&mut self, id: NodeId, snippet: String) {
        let scope = self.scope_mut();
        let block = scope.frame_mut().block;
        scope.cache.insert(id, Cached { snippet, block });
    }

    // ---- flow ------------------------------------------------------------

    fn indent_unit(&self) -> &str {
        &self.options.indent
    }

    /// Current indentation level (the function body is level 1).
    pub fn tab(&self) -> usize {
        self.scope().map_or(1, |s| 1 + s.blocks.len())
    }

    pub fn indent(&self, level: usize) -> String {
        self.indent_unit().repeat(level)
    }

    /// Append one line at the current indentation.
    pub fn add_line(&mut self, line: &str) {
        let indent = self.indent(self.tab());
        let frame = self.scope_mut().frame_mut();
        frame.code.push_str(&indent);
        frame.code.push_str(line);
        frame.code.push('\n');
    }

    /// Append already indented code.
    pub fn add_code(&mut self, code: &str) {
        self.scope_mut().frame_mut().code.push_str(code);
    }

    /// Open a nested block one level deeper.
    pub fn push_block(&mut self) {
        let block = self.next_block;
        self.next_block += 1;
        self.scope_mut().blocks.push(FlowFrame {
            block,
            code: String::new(),
        });
    }

    /// Close the innermost block and return its code for splicing.
    pub fn pop_block(&mut self) -> String {
        self.scope_mut()
            .blocks
            .pop()
            .map(|f| f.code)
            .unwrap_or_default()
    }

    // ---- variables -------------------------------------------------------

    /// Allocate a function-scope variable `{hint}{n}` with a stage-wide counter.
    pub fn declare_var(&mut self, ty: ShaderType, hint: &str) -> Result<String> {
        if matches!(ty, ShaderType::Void | ShaderType::Texture2D) {
            return Err(CompileError::type_resolution(format!(
                "cannot declare a variable of type {ty}"
            )));
        }
        let state = self.state_mut();
        let name = loop {
            let candidate = format!("{hint}{}", state.var_counter);
            state.var_counter += 1;
            let scope = state.scope_mut();
            if !scope.names.contains(&candidate) {
                scope.names.insert(candidate.clone());
                break candidate;
            }
        };
        state.scope_mut().vars.push(VarDecl {
            name: name.clone(),
            ty,
        });
        trace!(stage = self.stage.name(), %name, ty = %ty, "declared variable");
        Ok(name)
    }

    /// Declare a variable with a caller-chosen name (made unique in scope).
    pub fn declare_named_var(&mut self, name: &str, ty: ShaderType) -> Result<String> {
        if matches!(ty, ShaderType::Void | ShaderType::Texture2D) {
            return Err(CompileError::type_resolution(format!(
                "cannot declare a variable of type {ty}"
            )));
        }
        let scope = self.scope_mut();
        let name = scope.claim(&sanitize_wgsl_ident(name));
        scope.vars.push(VarDecl {
            name: name.clone(),
            ty,
        });
        Ok(name)
    }

    /// Variable backing a named property; one per scope and name.
    pub fn property_var(&mut self, name: &str, ty: ShaderType) -> Result<String> {
        if let Some((var, existing)) = self.scope_mut().properties.get(name).cloned() {
            if existing != ty {
                return Err(CompileError::type_resolution(format!(
                    "property '{name}' used as both {existing} and {ty}"
                )));
            }
            return Ok(var);
        }
        let var = self.declare_named_var(name, ty)?;
        self.scope_mut()
            .properties
            .insert(name.to_string(), (var.clone(), ty));
        Ok(var)
    }

    // ---- uniforms, textures, builtins ------------------------------------

    /// Register a uniform node once and return its access expression.
    pub fn register_uniform(&mut self, id: NodeId) -> Result<String> {
        let id = self.canonical(id)?;
        let NodeKind::Uniform { name, ty, group } = &self.graph().node(id).kind else {
            return Err(CompileError::type_resolution("not a uniform"));
        };
        let key = self.cache_key(id)?;
        let index = match self.uniform_index.get(&key) {
            Some(index) => *index,
            None => {
                let binding_name = self.registry.name_for(&key, name);
                let index = self.uniforms.len();
                self.uniforms.push(UniformDecl {
                    name: binding_name,
                    source_name: name.clone(),
                    ty: *ty,
                    group: *group,
                    binding: index as u32,
                    node: id,
                });
                self.uniform_index.insert(key, index);
                index
            }
        };
        let state = self.state_mut();
        if !state.uniforms.contains(&index) {
            state.uniforms.push(index);
        }
        let decl = &self.uniforms[index];
        Ok(self.backend.uniform_access(&decl.name, decl.ty))
    }

    /// Texture and sampler binding names for `name`.
    pub fn register_texture(&mut self, name: &str) -> (String, String) {
        let index = match self.texture_index.get(name) {
            Some(index) => *index,
            None => {
                let ident = sanitize_wgsl_ident(name);
                let index = self.textures.len();
                self.textures.push(TextureDecl {
                    name: name.to_string(),
                    texture: format!("t_{ident}"),
                    sampler: format!("s_{ident}"),
                    binding: (index * 2) as u32,
                });
                self.texture_index.insert(name.to_string(), index);
                index
            }
        };
        let state = self.state_mut();
        if !state.textures.contains(&index) {
            state.textures.push(index);
        }
        let decl = &self.textures[index];
        (decl.texture.clone(), decl.sampler.clone())
    }

    pub fn use_builtin(&mut self, builtin: Builtin) -> Result<String> {
        let access = self.backend.builtin_access(builtin, self.stage)?;
        self.state_mut().builtins.insert(builtin);
        Ok(access)
    }

    // ---- attributes and varyings ----------------------------------------

    fn vertex_attribute(&mut self, name: &str, ty: ShaderType) -> Result<String> {
        let ident = sanitize_wgsl_ident(name);
        match self.attributes.iter().find(|a| a.name == ident) {
            Some(existing) if existing.ty != ty => {
                return Err(CompileError::type_resolution(format!(
                    "attribute '{name}' read as both {} and {ty}",
                    existing.ty
                )));
            }
            Some(_) => {}
            None => {
                let location = self.attributes.len() as u32;
                self.attributes.push(AttributeDecl {
                    name: ident.clone(),
                    ty,
                    location,
                });
            }
        }
        Ok(self.backend.attribute_access(&ident))
    }

    fn register_varying(&mut self, key: String, name: &str, ty: ShaderType, source: VaryingSource) -> Result<()> {
        if self.varying_index.contains_key(&key) {
            return Ok(());
        }
        if self.vertex_done {
            return Err(CompileError::unsupported(
                "varying registered after the vertex stage was generated",
            ));
        }
        if ty.scalar() == Some(crate::compiler::types::Scalar::Bool) || !ty.is_numeric() || ty.is_matrix() {
            return Err(CompileError::unsupported(format!(
                "{ty} values cannot be passed between stages"
            )));
        }
        let mut ident = sanitize_wgsl_ident(name);
        let mut n = 1;
        while self.varyings.iter().any(|v| v.decl.name == ident) {
            ident = format!("{}_{n}", sanitize_wgsl_ident(name));
            n += 1;
        }
        debug!(varying = %ident, ty = %ty, "registered varying");
        let location = self.varyings.len() as u32;
        self.varying_index.insert(key, self.varyings.len());
        self.varyings.push(VaryingEntry {
            decl: VaryingDecl {
                name: ident,
                ty,
                location,
            },
            source,
        });
        Ok(())
    }

    /// Setup hook for attribute reads: promotes fragment reads to varyings.
    pub fn require_attribute(&mut self, name: &str, ty: ShaderType) -> Result<()> {
        match self.stage {
            ShaderStage::Vertex => Ok(()),
            ShaderStage::Fragment => self.register_varying(
                format!("attr:{name}"),
                &format!("v_{name}"),
                ty,
                VaryingSource::Attribute {
                    name: name.to_string(),
                    ty,
                },
            ),
            ShaderStage::Compute => Err(CompileError::unsupported(format!(
                "vertex attribute '{name}' read in a compute stage"
            ))),
        }
    }

    /// Setup hook for varying nodes read in the fragment stage.
    pub fn require_node_varying(&mut self, varying: NodeId, source: NodeId, name: Option<&str>) -> Result<()> {
        let source = self.canonical(source)?;
        let ty = self.node_type(source)?;
        let name = match name {
            Some(n) => n.to_string(),
            None => format!("v_varying{}", self.varyings.len()),
        };
        self.register_varying(format!("node:{varying:?}"), &name, ty, VaryingSource::Node(source))?;
        self.setup_in_stage(ShaderStage::Vertex, source)
    }

    /// Read an attribute in the current stage.
    pub fn attribute_read(&mut self, name: &str, ty: ShaderType) -> Result<String> {
        match self.stage {
            ShaderStage::Vertex => self.vertex_attribute(name, ty),
            ShaderStage::Fragment => self.varying_read(&format!("attr:{name}"), ty),
            ShaderStage::Compute => Err(CompileError::unsupported(format!(
                "vertex attribute '{name}' read in a compute stage"
            ))),
        }
    }

    /// Fragment-side read of a registered varying, converted to `ty`.
    pub fn node_varying_read(&mut self, varying: NodeId, ty: ShaderType) -> Result<String> {
        self.varying_read(&format!("node:{varying:?}"), ty)
    }

    fn varying_read(&mut self, key: &str, ty: ShaderType) -> Result<String> {
        let Some(entry) = self.varying_index.get(key).and_then(|i| self.varyings.get(*i)) else {
            return Err(CompileError::unsupported(format!(
                "varying '{key}' was not registered during setup"
            )));
        };
        let read = self.backend.varying_read(&entry.decl.name);
        crate::compiler::utils::convert_snippet(&read, entry.decl.ty, ty)
    }

    /// Emit exactly one vertex-stage write per varying.
    fn flush_varyings(&mut self) -> Result<()> {
        let entries = self.varyings.clone();
        for entry in entries {
            let value = match &entry.source {
                VaryingSource::Attribute { name, ty } => self.vertex_attribute(name, *ty)?,
                VaryingSource::Node(id) => self.build(*id, Some(entry.decl.ty))?,
            };
            let target = self.backend.varying_write(&entry.decl.name);
            self.add_line(&format!("{target} = {value};"));
        }
        Ok(())
    }

    // ---- functions -------------------------------------------------------

    pub fn with_signature<T>(
        &mut self,
        signature: usize,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.frames.push(signature);
        let result = f(self);
        self.frames.pop();
        result
    }

    fn intern_signature(&mut self, function: NodeId, types: Vec<ShaderType>) -> usize {
        if let Some(i) = self
            .signatures
            .iter()
            .position(|(f, t)| *f == function && *t == types)
        {
            return i;
        }
        self.signatures.push((function, types));
        self.signatures.len() - 1
    }

    /// Resolve the function a call node targets, scoring overloads by the
    /// number of leading parameters whose declared type matches exactly.
    pub fn resolve_call(&mut self, call: NodeId) -> Result<NodeId> {
        let call = self.canonical(call)?;
        let memo_key = (call, self.frames.last().copied());
        if let Some(f) = self.resolved_calls.get(&memo_key) {
            return Ok(*f);
        }
        let NodeKind::Call { function, args } = &self.graph().node(call).kind else {
            return Err(CompileError::type_resolution("not a call"));
        };
        let target = self.canonical(*function)?;
        let resolved = match &self.graph().node(target).kind {
            NodeKind::Function { .. } => target,
            NodeKind::Overload { candidates } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args {
                    arg_types.push(self.node_type(*arg)?);
                }
                let mut best: Option<(usize, NodeId)> = None;
                for candidate in candidates {
                    let NodeKind::Function { params, .. } = &self.graph().node(*candidate).kind else {
                        continue;
                    };
                    if params.len() != args.len() {
                        continue;
                    }
                    let score = params
                        .iter()
                        .zip(&arg_types)
                        .take_while(|(p, a)| p.ty == Some(**a))
                        .count();
                    if best.is_none_or(|(s, _)| score > s) {
                        best = Some((score, *candidate));
                    }
                }
                let (_, chosen) = best.ok_or_else(|| CompileError::OverloadResolution {
                    node: self.label(call),
                    arity: args.len(),
                    candidates: candidates.len(),
                })?;
                trace!(call = %self.label(call), chosen = %self.label(chosen), "resolved overload");
                chosen
            }
            _ => {
                return Err(CompileError::type_resolution(format!(
                    "call target {} is not a function",
                    self.label(target)
                )));
            }
        };
        self.resolved_calls.insert(memo_key, resolved);
        Ok(resolved)
    }

    /// Resolved function and concrete signature of a call.
    pub fn call_target(&mut self, call: NodeId) -> Result<(NodeId, usize)> {
        let function = self.resolve_call(call)?;
        let call = self.canonical(call)?;
        let NodeKind::Call { args, .. } = &self.graph().node(call).kind else {
            return Err(CompileError::type_resolution("not a call"));
        };
        let NodeKind::Function { params, .. } = &self.graph().node(function).kind else {
            return Err(CompileError::type_resolution("call target is not a function"));
        };
        if params.len() != args.len() {
            return Err(CompileError::OverloadResolution {
                node: self.label(call),
                arity: args.len(),
                candidates: 1,
            });
        }
        let mut types = Vec::with_capacity(params.len());
        for (param, arg) in params.iter().zip(args) {
            types.push(match param.ty {
                Some(ty) => ty,
                None => self.node_type(*arg)?,
            });
        }
        Ok((function, self.intern_signature(function, types)))
    }

    pub fn signature(&self, signature: usize) -> Option<&(NodeId, Vec<ShaderType>)> {
        self.signatures.get(signature)
    }

    /// Type of a parameter under the innermost call frame.
    pub fn parameter_type(&self, function: NodeId, index: usize) -> Result<ShaderType> {
        let declared = match &self.graph().node(function).kind {
            NodeKind::Function { params, .. } => params.get(index).and_then(|p| p.ty),
            _ => None,
        };
        if let Some(ty) = declared {
            return Ok(ty);
        }
        self.frames
            .last()
            .and_then(|sig| self.signatures.get(*sig))
            .filter(|(f, _)| *f == function)
            .and_then(|(_, types)| types.get(index).copied())
            .ok_or_else(|| {
                CompileError::type_resolution("parameter type is only known inside a call")
            })
    }

    /// Name of a parameter inside the function body being generated.
    pub fn parameter_name(&self, function: NodeId, index: usize) -> Result<String> {
        self.scope()
            .filter(|s| s.function == Some(function))
            .and_then(|s| s.params.get(index).cloned())
            .ok_or_else(|| {
                CompileError::type_resolution("parameter used outside of its function body")
            })
    }

    /// Generate (once per signature and stage) the function a call targets
    /// and return its name.
    pub fn build_function(&mut self, function: NodeId, signature: usize) -> Result<String> {
        let types = self
            .signatures
            .get(signature)
            .map(|(_, t)| t.clone())
            .unwrap_or_default();
        let key: FunctionKey = (function, types.clone(), self.stage);
        if let Some(name) = self.function_index.get(&key) {
            return Ok(name.clone());
        }
        if !self.functions_in_progress.insert(key.clone()) {
            let mut chain = self.build_chain.clone();
            chain.push(function);
            return Err(self.cycle_error(function, &chain));
        }
        let NodeKind::Function {
            name,
            params,
            return_ty,
            body,
        } = &self.graph().node(function).kind
        else {
            return Err(CompileError::type_resolution("not a function"));
        };

        let base = sanitize_wgsl_ident(name);
        let mut fn_name = base.clone();
        let mut n = 1;
        while self.function_names.contains(&fn_name) {
            fn_name = format!("{base}_{n}");
            n += 1;
        }
        self.function_names.insert(fn_name.clone());

        let mut scope = Scope {
            function: Some(function),
            ..Scope::default()
        };
        let param_names: Vec<String> = params
            .iter()
            .map(|p| scope.claim(&sanitize_wgsl_ident(&p.name)))
            .collect();
        scope.params = param_names.clone();
        self.state_mut().functions.push(scope);
        let body_id = *body;
        let declared_ret = *return_ty;
        // loops of the caller do not enclose the function body
        let loop_depth = std::mem::take(&mut self.loop_depth);
        let result = self.with_signature(signature, |ctx| {
            let ret = match declared_ret {
                Some(ty) => ty,
                None => ctx.node_type(body_id)?,
            };
            let value = if ret == ShaderType::Void {
                ctx.build_statement(body_id)?;
                None
            } else {
                Some(ctx.build(body_id, Some(ret))?)
            };
            Ok((ret, value))
        });
        self.loop_depth = loop_depth;
        let scope = self.state_mut().functions.pop().unwrap_or_default();
        self.functions_in_progress.remove(&key);
        let (ret, value) = result?;

        let source = FunctionSource {
            name: fn_name.clone(),
            params: param_names.into_iter().zip(types).collect(),
            return_ty: ret,
            vars: scope.vars,
            flow: scope.root.code,
            result: value,
            indent: self.options.indent.clone(),
        };
        let code = self.backend.function_code(&source, self.graph.structs())?;
        debug!(function = %fn_name, stage = self.stage.name(), "generated function");
        self.functions.push(FunctionCode {
            name: fn_name.clone(),
            code,
        });
        self.function_index.insert(key, fn_name.clone());
        self.state_mut().function_names.push(fn_name.clone());
        Ok(fn_name)
    }

    // ---- loops -----------------------------------------------------------

    /// Bind the index variable of `loop_node` for the duration of its body.
    pub fn enter_loop(&mut self, loop_node: NodeId, ty: ShaderType) -> String {
        const NAMES: [&str; 3] = ["i", "j", "k"];
        let name = NAMES
            .get(self.loop_depth)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("i{}", self.loop_depth));
        self.loop_depth += 1;
        self.loop_vars.insert(loop_node, (name.clone(), ty));
        name
    }

    pub fn exit_loop(&mut self, loop_node: NodeId) {
        self.loop_depth = self.loop_depth.saturating_sub(1);
        self.loop_vars.remove(&loop_node);
    }

    pub fn loop_var(&self, loop_node: NodeId) -> Option<&(String, ShaderType)> {
        self.loop_vars.get(&loop_node)
    }

    pub fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }

    pub fn struct_decl(&self, ty: ShaderType) -> Option<&'a StructDecl> {
        match ty {
            ShaderType::Struct(id) => self.graph.struct_decl(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ShaderCompiler;

    fn shared_sum(g: &mut NodeGraph) -> NodeId {
        let x = g.uniform("x", ShaderType::FLOAT, UniformGroup::Object);
        let one = g.float(1.0);
        g.add(x, one)
    }

    #[test]
    fn shared_values_are_hoisted_once_per_stage() {
        let mut g = NodeGraph::new();
        let s = shared_sum(&mut g);
        let zero = g.float(0.0);
        let one = g.float(1.0);
        let clip = g.join(&[s, s, zero, one]);
        let color = g.join(&[s, s, s, one]);
        let program = ShaderCompiler::default()
            .compile(&g, &StageRoots::render(clip, color))
            .unwrap();

        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let code = program.stage(stage).unwrap();
            assert_eq!(code.vars.len(), 1, "{}", code.flow);
            assert_eq!(code.vars[0].name, "nodeVar0");
            assert_eq!(code.flow.matches("nodeVar0 = (u_x + 1.0);").count(), 1, "{}", code.flow);
        }
        assert_eq!(program.uniforms.len(), 1);
    }

    #[test]
    fn roots_from_another_graph_are_rejected() {
        let mut big = NodeGraph::new();
        for i in 0..8 {
            big.float(i as f32);
        }
        let foreign = big.vec4(0.0, 0.0, 0.0, 1.0);

        let mut g = NodeGraph::new();
        let clip = g.vec4(0.0, 0.0, 0.0, 1.0);
        let err = ShaderCompiler::default()
            .compile(&g, &StageRoots::render(clip, foreign))
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeResolution { .. }), "{err}");
        assert!(err.to_string().contains("fragment root"), "{err}");

        let err = ShaderCompiler::default()
            .compile(&g, &StageRoots::compute(foreign))
            .unwrap_err();
        assert!(err.to_string().contains("compute root"), "{err}");
    }

    #[test]
    fn hoisting_can_be_disabled() {
        let mut g = NodeGraph::new();
        let s = shared_sum(&mut g);
        let one = g.float(1.0);
        let clip = g.join(&[s, s, s, one]);
        let options = CompilerOptions {
            hoist_shared: false,
            ..CompilerOptions::default()
        };
        let program = ShaderCompiler::new(options)
            .compile(&g, &StageRoots::render(clip, clip))
            .unwrap();
        let vertex = program.stage(ShaderStage::Vertex).unwrap();
        assert!(vertex.vars.is_empty());
        assert_eq!(vertex.result.as_deref().unwrap().matches("(u_x + 1.0)").count(), 3);
    }

    #[test]
    fn rewired_cycles_are_reported() {
        let mut g = NodeGraph::new();
        let a = g.float(1.0);
        let b = g.float(2.0);
        let x = g.add(a, b);
        let y = g.mul(x, b);
        g.set_input(x, "b", y).unwrap();
        let clip = g.convert(y, ShaderType::VEC4);
        let err = ShaderCompiler::default()
            .compile(&g, &StageRoots::render(clip, clip))
            .unwrap_err();
        assert!(matches!(err, CompileError::Cycle { .. }), "{err}");
    }

    #[test]
    fn nested_blocks_indent_one_level_deeper() {
        let mut g = NodeGraph::new();
        let clip = g.vec4(0.0, 0.0, 0.0, 1.0);
        let uv = g.attribute("uv", ShaderType::VEC2);
        let u = g.split(uv, "x");
        let half = g.float(0.5);
        let cond = g.less(u, half);
        let discard = g.discard();
        let branch = g.conditional(cond, discard, None);
        let white = g.vec4(1.0, 1.0, 1.0, 1.0);
        let color = g.stack(&[branch], Some(white));
        let program = ShaderCompiler::default()
            .compile(&g, &StageRoots::render(clip, color))
            .unwrap();
        let flow = &program.stage(ShaderStage::Fragment).unwrap().flow;
        assert!(flow.contains("    if ("), "{flow}");
        assert!(flow.contains("        discard;"), "{flow}");
    }
}
