use anyhow::{bail, Context, Result};
use tbforge_core::{DataFileStats, InterfaceRegistry};
use tbforge_ir::{Dut, Header, HeaderMode, InterfaceType, Testbench, TimeFormat, WaitCondition};

const SV_TEMPLATE: &str = include_str!("../templates/testbench.sv");
const CPP_TEMPLATE: &str = include_str!("../templates/testbench.cpp");

const PLACEHOLDER_PREFIX: &str = "TBF_";
const INDENT: &str = "    ";

/// Target language of a generated testbench.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Sv,
    Cpp,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Sv => "sv",
            Language::Cpp => "cpp",
        }
    }

    pub fn builtin_template(&self) -> &'static str {
        match self {
            Language::Sv => SV_TEMPLATE,
            Language::Cpp => CPP_TEMPLATE,
        }
    }
}

/// Values taken from the generated data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub data_file: String,
    pub max_vectors: usize,
    pub max_parallel: usize,
    pub max_arg_num: usize,
}

impl TemplateContext {
    pub fn from_stats(data_file: impl Into<String>, stats: &DataFileStats) -> Self {
        Self {
            data_file: data_file.into(),
            max_vectors: stats.test_vector_count,
            max_parallel: stats.max_parallel,
            max_arg_num: stats.max_arg_num,
        }
    }
}

/// Returns the run of spaces directly in front of the first `keyword` that starts a line.
pub fn get_indentation<'a>(keyword: &str, text: &'a str) -> &'a str {
    let mut start = 0;
    for line in text.split('\n') {
        let trimmed = line.trim_start_matches(' ');
        if trimmed.starts_with(keyword) {
            return &text[start..start + line.len() - trimmed.len()];
        }
        start += line.len() + 1;
    }
    ""
}

/// Replaces every occurrence of `key`. Lines after the first in `value` are indented to match
/// the placeholder's own indentation.
pub fn replace_placeholder(text: &str, key: &str, value: &str) -> String {
    let indent = get_indentation(key, text);
    let joined = value.split('\n').collect::<Vec<_>>().join(&format!("\n{}", indent));
    text.replace(key, &joined)
}

pub struct TestbenchGenerator;

impl TestbenchGenerator {
    pub fn generate(
        language: Language,
        testbench: &Testbench,
        registry: &InterfaceRegistry,
        context: &TemplateContext,
        template: Option<&str>,
    ) -> Result<String> {
        let template = template.unwrap_or_else(|| language.builtin_template());
        let output = match language {
            Language::Sv => Self::generate_sv(testbench, registry, context, template)?,
            Language::Cpp => Self::generate_cpp(testbench, registry, context, template)?,
        };

        let leftover = output.matches(PLACEHOLDER_PREFIX).count();
        if leftover > 0 {
            tracing::warn!(
                "{} testbench still contains {} unresolved {}* placeholders",
                language.as_str(),
                leftover,
                PLACEHOLDER_PREFIX
            );
        }
        Ok(output)
    }

    fn generate_sv(
        tb: &Testbench,
        registry: &InterfaceRegistry,
        context: &TemplateContext,
        template: &str,
    ) -> Result<String> {
        let mut out = Self::common(tb, context, template, Language::Sv);
        let replacements = [
            ("TBF_TIMESCALE", tb.metadata.timescale.clone()),
            ("TBF_TIMEFORMAT", Self::timeformat(&tb.metadata.time_format)?),
            ("TBF_MAX_VECTORS", context.max_vectors.max(1).to_string()),
            ("TBF_MAX_PARALLEL", context.max_parallel.max(1).to_string()),
            ("TBF_MAX_DATA_SIZE", tb.dut.max_signal_size().to_string()),
            ("TBF_FLAG_COUNT", tb.metadata.flag_count.max(1).to_string()),
            ("TBF_TB_SIGNAL_LIST", Self::signal_list(&tb.dut, registry)?),
            ("TBF_DUT_PORTS", Self::dut_ports(&tb.dut, registry)?),
            ("TBF_CLOCK_GENERATORS", Self::clock_generators(&tb.dut)),
            ("TBF_IF_ELSE_SIGNAL", Self::signal_block(&tb.dut)),
            ("TBF_IF_ELSE_WAIT", Self::wait_block(&tb.wait_conditions)),
            ("TBF_IF_ELSE_INTERFACE", Self::sv_interface_block(&tb.dut, registry)?),
        ];
        for (key, value) in &replacements {
            out = replace_placeholder(&out, key, value);
        }
        Ok(out)
    }

    fn generate_cpp(
        tb: &Testbench,
        registry: &InterfaceRegistry,
        context: &TemplateContext,
        template: &str,
    ) -> Result<String> {
        let mut out = Self::common(tb, context, template, Language::Cpp);
        let call_args = tb
            .dut
            .interfaces
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let replacements = [
            ("TBF_DECLARE_INTERFACES", Self::cpp_declarations(&tb.dut)),
            ("TBF_CALL_ARGS", call_args),
            ("TBF_ELSE_IF_INTERFACE", Self::cpp_interface_block(&tb.dut, registry)?),
        ];
        for (key, value) in &replacements {
            out = replace_placeholder(&out, key, value);
        }
        Ok(out)
    }

    /// Placeholders shared by both languages.
    fn common(tb: &Testbench, context: &TemplateContext, template: &str, lang: Language) -> String {
        let replacements = [
            ("TBF_HEADER_FILE", Self::headers(&tb.metadata.headers, lang)),
            ("TBF_MODULE_NAME", tb.metadata.module_name.clone()),
            ("TBF_DATA_FILE", context.data_file.clone()),
            // zero-sized argument arrays do not compile in either language
            ("TBF_MAX_ARG_NUM", context.max_arg_num.max(1).to_string()),
        ];
        let mut out = template.to_string();
        for (key, value) in &replacements {
            out = replace_placeholder(&out, key, value);
        }
        out
    }

    /// Builds the `$timeformat` call for `format`.
    pub fn timeformat(format: &TimeFormat) -> Result<String> {
        let unit = format.unit.trim();
        let (exponent, suffix) = [
            ("fs", -15),
            ("ps", -12),
            ("ns", -9),
            ("us", -6),
            ("ms", -3),
            ("s", 0),
        ]
        .iter()
        .find(|(suffix, _)| unit.ends_with(*suffix))
        .map(|(suffix, exponent)| (*exponent, *suffix))
        .with_context(|| format!("Unknown time format unit '{}'", format.unit))?;
        Ok(format!(
            "$timeformat({}, {}, \" {}\", 0);",
            exponent, format.precision, suffix
        ))
    }

    pub fn headers(headers: &[Header], lang: Language) -> String {
        headers
            .iter()
            .filter_map(|h| {
                let sv = h.file.ends_with(".v") || h.file.ends_with(".sv");
                let cpp = h.file.ends_with(".h") || h.file.ends_with(".hpp");
                match (h.mode, lang) {
                    (HeaderMode::Cpp, Language::Cpp) => Some(format!("#include \"{}\"", h.file)),
                    (HeaderMode::Sv, Language::Sv) => Some(format!("`include \"{}\"", h.file)),
                    (HeaderMode::Auto, Language::Cpp) if cpp => {
                        Some(format!("#include \"{}\"", h.file))
                    }
                    (HeaderMode::Auto, Language::Sv) if sv => {
                        Some(format!("`include \"{}\"", h.file))
                    }
                    _ => None,
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Chained `if` over wait keys. `$N` in a condition refers to argument `N` of the wait line.
    pub fn wait_block(conditions: &[WaitCondition]) -> String {
        let mut lines = Vec::new();
        for (n, condition) in conditions.iter().enumerate() {
            let prefix = if n == 0 { "" } else { "else " };
            lines.push(format!("{}if (id == \"{}\") begin", prefix, condition.key));
            let mut body = substitute_args(&condition.condition);
            if !body.ends_with(';') {
                body.push(';');
            }
            lines.push(format!("{}{}", INDENT, body));
            lines.push("end".to_string());
        }
        lines.join("\n")
    }

    fn signal_block(dut: &Dut) -> String {
        dut.init_signals()
            .iter()
            .enumerate()
            .map(|(n, name)| {
                let prefix = if n == 0 { "" } else { "else " };
                format!("{}if (id == \"{}\") {} = args[0];", prefix, name, name)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn signal_list(dut: &Dut, registry: &InterfaceRegistry) -> Result<String> {
        let mut lines = Vec::new();
        for clock in &dut.clocks {
            lines.push(format!("logic {} = 0;", clock.name));
        }
        for reset in &dut.resets {
            lines.push(format!("logic {};", reset));
        }
        for signal in &dut.signals {
            lines.push(declaration(&signal.name, signal.size));
        }
        for interface in &dut.interfaces {
            let plugin = registry.lookup(interface.interface_type)?;
            for arg in plugin.sv_args() {
                lines.push(declaration(&format!("{}_{}", interface.name, arg), interface.width));
            }
        }
        Ok(lines.join("\n"))
    }

    fn dut_ports(dut: &Dut, registry: &InterfaceRegistry) -> Result<String> {
        let mut ports: Vec<String> = dut
            .clocks
            .iter()
            .map(|c| c.name.clone())
            .chain(dut.resets.iter().cloned())
            .chain(dut.signals.iter().map(|s| s.name.clone()))
            .collect();
        for interface in &dut.interfaces {
            let plugin = registry.lookup(interface.interface_type)?;
            ports.extend(
                plugin
                    .sv_args()
                    .iter()
                    .map(|arg| format!("{}_{}", interface.name, arg)),
            );
        }
        Ok(ports
            .iter()
            .map(|p| format!(".{}({})", p, p))
            .collect::<Vec<_>>()
            .join(",\n"))
    }

    fn clock_generators(dut: &Dut) -> String {
        dut.clocks
            .iter()
            .map(|c| format!("always #({}/2) {} <= ~{};", c.period, c.name, c.name))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Statement that advances one beat: the rising edge of the slowest clock.
    fn vector_sync(dut: &Dut) -> String {
        let slowest = dut.clocks.iter().max_by_key(|c| {
            // periods compared in femtoseconds
            let scale = 10u128.pow((c.period.unit.exponent() + 15) as u32);
            c.period.value as u128 * scale
        });
        match slowest {
            Some(clock) => format!("@(posedge {});", clock.name),
            None => "#1;".to_string(),
        }
    }

    fn sv_interface_block(dut: &Dut, registry: &InterfaceRegistry) -> Result<String> {
        let sync = Self::vector_sync(dut);
        let mut lines = Vec::new();
        for interface in &dut.interfaces {
            let plugin = registry.lookup(interface.interface_type)?;
            lines.push(format!(
                "else if (interface_type == \"{}\" && id == \"{}\") begin",
                interface.interface_type, interface.name
            ));
            for (n, arg) in plugin.sv_args().iter().enumerate() {
                lines.push(format!("{}{}_{} = args[{}];", INDENT, interface.name, arg, n));
            }
            lines.push(format!("{}{}", INDENT, sync));
            lines.push("end".to_string());
        }
        Ok(lines.join("\n"))
    }

    fn cpp_declarations(dut: &Dut) -> String {
        dut.interfaces
            .iter()
            .map(|i| match i.interface_type {
                InterfaceType::Axi4Stream => format!(
                    "hls::stream<{}> {};",
                    i.stream_class.as_deref().unwrap_or("axis_t"),
                    i.name
                ),
                InterfaceType::Axi4LiteSlave => {
                    format!("ap_uint<{}> {}[MAX_STRING_SIZE];", i.width.max(1), i.name)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cpp_interface_block(dut: &Dut, registry: &InterfaceRegistry) -> Result<String> {
        let mut lines = Vec::new();
        for interface in &dut.interfaces {
            let plugin = registry.lookup(interface.interface_type)?;
            lines.push(format!("else if(!strcmp(interfaceType, \"{}\")){{", interface.name));
            match interface.interface_type {
                InterfaceType::Axi4Stream => {
                    let class = interface.stream_class.as_deref().unwrap_or("axis_t");
                    let beat = format!("{}_beat", interface.name);
                    lines.push(format!("{}{} {};", INDENT, class, beat));
                    for (n, arg) in plugin.cpp_args().iter().enumerate() {
                        let field = arg.strip_prefix('t').unwrap_or(arg);
                        lines.push(format!("{}{}.{} = args[{}];", INDENT, beat, field, n));
                    }
                    lines.push(format!("{}{}.write({});", INDENT, interface.name, beat));
                }
                InterfaceType::Axi4LiteSlave => {
                    if plugin.cpp_args().len() < 2 {
                        bail!(
                            "Interface '{}' needs an address and a data argument",
                            interface.name
                        );
                    }
                    lines.push(format!("{}{}[args[0]] = args[1];", INDENT, interface.name));
                }
            }
            lines.push("}".to_string());
        }
        Ok(lines.join("\n"))
    }
}

fn declaration(name: &str, size: u32) -> String {
    if size <= 1 {
        format!("logic {};", name)
    } else {
        format!("logic [{}:0] {};", size - 1, name)
    }
}

/// Rewrites `$N` references into `args[N]`.
fn substitute_args(condition: &str) -> String {
    let mut out = String::with_capacity(condition.len());
    let mut chars = condition.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            let mut index = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                index.push(d);
                chars.next();
            }
            out.push_str(&format!("args[{}]", index));
        } else {
            out.push(c);
        }
    }
    out
}
