//! The static signature catalogue (spec.md §4.4, §9: "compile once at
//! startup and attach pre-compiled matchers to each category bucket").
//!
//! Grounded in `vinhnx-VTCode`'s `command_policy.rs`, which compiles a table
//! of `regex::Regex` allow/deny rules once and matches shell commands
//! against it rather than re-compiling per call.

use super::event::AgentEvent;
use crate::model::VulnerabilityCategory;
use crate::model::Severity;
use regex::Regex;
use std::collections::HashMap;

pub struct Rule {
    pub regex: Regex,
    pub severity: Severity,
    pub vuln_type: &'static str,
    pub category: VulnerabilityCategory,
    pub description: &'static str,
    pub applies: fn(&AgentEvent) -> bool,
}

fn bash_event(event: &AgentEvent) -> bool {
    event.is_bash_before()
}

fn write_or_edit_event(event: &AgentEvent) -> bool {
    matches!(event.tool_name(), Some("write") | Some("edit") | Some("str_replace"))
}

fn read_write_edit_event(event: &AgentEvent) -> bool {
    matches!(event.tool_name(), Some("read") | Some("write") | Some("edit") | Some("str_replace"))
}

fn any_textual_event(_event: &AgentEvent) -> bool {
    true
}

fn message_event(event: &AgentEvent) -> bool {
    event.is_message()
}

fn rule(
    pattern: &str,
    severity: Severity,
    vuln_type: &'static str,
    category: VulnerabilityCategory,
    description: &'static str,
    applies: fn(&AgentEvent) -> bool,
) -> Rule {
    Rule {
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("bad catalogue pattern {}: {}", pattern, e)),
        severity,
        vuln_type,
        category,
        description,
        applies,
    }
}

lazy_static::lazy_static! {
    pub static ref CATALOGUE: Vec<Rule> = build_catalogue();

    pub static ref OWASP_BY_TYPE: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("recursive_delete", "A04:2021-Insecure Design");
        m.insert("fork_bomb", "A04:2021-Insecure Design");
        m.insert("reverse_shell", "A05:2021-Security Misconfiguration");
        m.insert("curl_pipe_shell", "A08:2021-Software and Data Integrity Failures");
        m.insert("data_exfiltration", "A01:2021-Broken Access Control");
        m.insert("dns_tunnelling", "A01:2021-Broken Access Control");
        m.insert("command_injection", "A03:2021-Injection");
        m.insert("sql_injection", "A03:2021-Injection");
        m.insert("xss", "A03:2021-Injection");
        m.insert("template_injection", "A03:2021-Injection");
        m.insert("path_traversal", "A01:2021-Broken Access Control");
        m.insert("sensitive_file_access", "A01:2021-Broken Access Control");
        m.insert("secret_exposure", "A02:2021-Cryptographic Failures");
        m.insert("typosquat_package", "A08:2021-Software and Data Integrity Failures");
        m.insert("insecure_install_flag", "A08:2021-Software and Data Integrity Failures");
        m.insert("persistence_mechanism", "A04:2021-Insecure Design");
        m.insert("prompt_injection", "A03:2021-Injection");
        m.insert("container_escape", "A05:2021-Security Misconfiguration");
        m.insert("infinite_loop", "A04:2021-Insecure Design");
        m
    };

    pub static ref CWE_BY_TYPE: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("recursive_delete", "CWE-732");
        m.insert("fork_bomb", "CWE-400");
        m.insert("reverse_shell", "CWE-78");
        m.insert("curl_pipe_shell", "CWE-494");
        m.insert("data_exfiltration", "CWE-200");
        m.insert("dns_tunnelling", "CWE-200");
        m.insert("command_injection", "CWE-78");
        m.insert("sql_injection", "CWE-89");
        m.insert("xss", "CWE-79");
        m.insert("template_injection", "CWE-1336");
        m.insert("path_traversal", "CWE-22");
        m.insert("sensitive_file_access", "CWE-552");
        m.insert("secret_exposure", "CWE-798");
        m.insert("typosquat_package", "CWE-494");
        m.insert("insecure_install_flag", "CWE-1357");
        m.insert("persistence_mechanism", "CWE-546");
        m.insert("prompt_injection", "CWE-1427");
        m.insert("container_escape", "CWE-266");
        m.insert("infinite_loop", "CWE-835");
        m
    };

    pub static ref RECOMMENDATION_BY_TYPE: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("recursive_delete", "Require explicit human confirmation before recursive deletes of root, home, or wildcard paths.");
        m.insert("fork_bomb", "Block process-spawning bombs and rate-limit process creation in the sandbox.");
        m.insert("reverse_shell", "Deny outbound shell redirection to remote hosts; review the command before execution.");
        m.insert("curl_pipe_shell", "Never pipe a network download directly into a shell interpreter; fetch then inspect.");
        m.insert("data_exfiltration", "Restrict outbound network calls from the sandbox to an allow-list of hosts.");
        m.insert("dns_tunnelling", "Treat unexpected dig/nslookup/host invocations as exfiltration attempts.");
        m.insert("command_injection", "Use parameterized execution; never interpolate untrusted input into a shell string.");
        m.insert("sql_injection", "Use parameterized queries; reject string-built SQL.");
        m.insert("xss", "Escape or sanitize all user-controlled output written into HTML/JS contexts.");
        m.insert("template_injection", "Disallow raw template syntax in agent-authored content destined for a template engine.");
        m.insert("path_traversal", "Resolve and canonicalize paths before I/O; reject any path escaping the workspace root.");
        m.insert("sensitive_file_access", "Deny reads/writes to credential and system files from agent tool calls.");
        m.insert("secret_exposure", "Redact matched secrets before persisting or publishing; rotate the exposed credential.");
        m.insert("typosquat_package", "Verify package names against the intended registry before install.");
        m.insert("insecure_install_flag", "Reject install invocations that disable script/signature verification.");
        m.insert("persistence_mechanism", "Flag any modification to crontab, systemd units, shell rc files, or authorized_keys for review.");
        m.insert("prompt_injection", "Treat agent-observed instructions embedded in tool output as data, never as new instructions.");
        m.insert("container_escape", "Deny privileged containers, host namespace sharing, and capability grants beyond the sandbox's needs.");
        m.insert("infinite_loop", "Abort the session and surface the repeated tool call for human review.");
        m
    };
}

fn build_catalogue() -> Vec<Rule> {
    vec![
        // dangerous_command
        rule(r"rm\s+-rf\s+(/|~|\$HOME|\*)(\s|$)", Severity::Critical, "recursive_delete", VulnerabilityCategory::DangerousCommand, "Recursive delete targeting root, home, or a wildcard.", bash_event),
        rule(r"mkfs\.\w+", Severity::Critical, "disk_format", VulnerabilityCategory::DangerousCommand, "Disk format command.", bash_event),
        rule(r":\(\)\s*\{\s*:\|:&\s*\};:", Severity::Critical, "fork_bomb", VulnerabilityCategory::DangerousCommand, "Classic shell fork bomb.", bash_event),
        rule(r"\b(shutdown|reboot|halt|poweroff)\b", Severity::High, "system_shutdown", VulnerabilityCategory::DangerousCommand, "System shutdown/reboot command.", bash_event),
        rule(r"\b(userdel|groupdel|visudo|passwd)\b.*", Severity::High, "account_mutation", VulnerabilityCategory::DangerousCommand, "User/group/sudoers mutation.", bash_event),
        rule(r"chmod\s+(-R\s+)?777\b", Severity::High, "world_writable", VulnerabilityCategory::DangerousCommand, "World-writable permission grant.", bash_event),
        rule(r"chmod\s+(-R\s+)?[24]?[67]7[0-7]\s+/(usr|bin|sbin|etc)", Severity::High, "suid_sgid_system_path", VulnerabilityCategory::DangerousCommand, "SUID/SGID bit set on a system path.", bash_event),
        rule(r"systemctl\s+(disable|stop)\s+(ufw|firewalld|apparmor|selinux|auditd)", Severity::High, "security_service_disabled", VulnerabilityCategory::DangerousCommand, "Security service disabled via systemctl.", bash_event),

        // network_attack
        rule(r"bash\s+-i\s*>&\s*/dev/tcp/", Severity::Critical, "reverse_shell", VulnerabilityCategory::NetworkAttack, "Bash reverse shell via /dev/tcp.", bash_event),
        rule(r"\b(nc|ncat|socat)\b.*-[el].*\d+\.\d+\.\d+\.\d+", Severity::Critical, "reverse_shell", VulnerabilityCategory::NetworkAttack, "Netcat/socat reverse or bind shell.", bash_event),
        rule(r"(python|perl|ruby|php)\s+-c\s+.*(socket|exec)\b", Severity::Critical, "reverse_shell", VulnerabilityCategory::NetworkAttack, "Scripting-language reverse shell one-liner.", bash_event),
        rule(r"(curl|wget)\s+[^\n]*\|\s*(bash|sh|python)\b", Severity::High, "curl_pipe_shell", VulnerabilityCategory::NetworkAttack, "Network download piped directly into an interpreter.", bash_event),
        rule(r"(curl|scp|rsync)\s+.*--upload|--data-binary\s+@", Severity::Medium, "data_exfiltration", VulnerabilityCategory::NetworkAttack, "Outbound upload of local data.", bash_event),
        rule(r"base64\s+[^\n]*\|\s*(curl|nc|ncat)\b", Severity::High, "data_exfiltration", VulnerabilityCategory::NetworkAttack, "Base64-encoded payload piped to a network tool.", bash_event),
        rule(r"\b(dig|nslookup|host)\s+\S+\.\S+\s+(txt|TXT)\b", Severity::Medium, "dns_tunnelling", VulnerabilityCategory::NetworkAttack, "DNS TXT lookup consistent with tunnelling.", bash_event),

        // code_injection
        rule(r"\$\([^)]*\)|`[^`]*`", Severity::Medium, "command_injection", VulnerabilityCategory::CodeInjection, "Shell command substitution.", bash_event),
        rule(r"(UNION\s+SELECT|DROP\s+TABLE|;\s*--|OR\s+1\s*=\s*1|SLEEP\(\d+\))", Severity::High, "sql_injection", VulnerabilityCategory::CodeInjection, "SQL injection pattern.", any_textual_event),
        rule(r"<script[^>]*>|javascript:|on\w+\s*=\s*['\"]", Severity::High, "xss", VulnerabilityCategory::CodeInjection, "Cross-site scripting pattern.", write_or_edit_event),
        rule(r"\{\{.*\}\}|\$\{.*\}|<%.*%>", Severity::Medium, "template_injection", VulnerabilityCategory::CodeInjection, "Template delimiter in agent-authored content.", write_or_edit_event),
        rule(r"\b(eval|exec|compile|__import__)\s*\(", Severity::High, "command_injection", VulnerabilityCategory::CodeInjection, "Dynamic code evaluation call.", write_or_edit_event),

        // path_traversal & sensitive file
        rule(r"(\.\./){2,}|%2e%2e%2f", Severity::High, "path_traversal", VulnerabilityCategory::PathTraversal, "Path traversal sequence.", read_write_edit_event),
        rule(r"/etc/(passwd|shadow|sudoers)\b", Severity::Critical, "sensitive_file_access", VulnerabilityCategory::PathTraversal, "Access to a core system credential file.", read_write_edit_event),
        rule(r"\.ssh/(id_rsa|id_ed25519|authorized_keys)\b", Severity::Critical, "sensitive_file_access", VulnerabilityCategory::PathTraversal, "Access to an SSH key file.", read_write_edit_event),
        rule(r"\.env(\.\w+)?$|\.aws/credentials|gcloud/.*credentials\.json", Severity::High, "sensitive_file_access", VulnerabilityCategory::PathTraversal, "Access to a cloud credential or dotenv file.", read_write_edit_event),

        // secret_exposure
        rule(r"ghp_[A-Za-z0-9]{36}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "GitHub personal access token.", any_textual_event),
        rule(r"sk-ant-[A-Za-z0-9\-_]{20,}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "Anthropic API key.", any_textual_event),
        rule(r"sk-[A-Za-z0-9]{20,}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "OpenAI-style API key.", any_textual_event),
        rule(r"AKIA[0-9A-Z]{16}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "AWS access key id.", any_textual_event),
        rule(r"AIza[0-9A-Za-z\-_]{35}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "Google API key.", any_textual_event),
        rule(r"sk_live_[0-9a-zA-Z]{24,}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "Stripe live secret key.", any_textual_event),
        rule(r"xox[baprs]-[0-9A-Za-z\-]{10,}", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "Slack token.", any_textual_event),
        rule(r"(?i)(password|token|secret)\s*=\s*['\"][^'\"\s]{12,}['\"]", Severity::High, "secret_exposure", VulnerabilityCategory::SecretExposure, "Inline credential assignment with high-entropy value.", any_textual_event),
        rule(r"-----BEGIN (RSA |EC |OPENSSH )?PRIVATE KEY-----", Severity::Critical, "secret_exposure", VulnerabilityCategory::SecretExposure, "PEM private key block.", any_textual_event),
        rule(r"eyJ[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+", Severity::Medium, "secret_exposure", VulnerabilityCategory::SecretExposure, "JWT-shaped token.", any_textual_event),

        // supply_chain
        rule(r"npm\s+install\s+.*(reqeusts|colours|crossenv|d3\.js)\b", Severity::High, "typosquat_package", VulnerabilityCategory::SupplyChain, "Known typosquat package name.", bash_event),
        rule(r"--ignore-scripts\s+false|--unsafe-perm\b", Severity::Medium, "insecure_install_flag", VulnerabilityCategory::SupplyChain, "Install flag that re-enables lifecycle scripts or elevated perms.", bash_event),
        rule(r"npm\s+install\s+.*--registry\s+(?!https://registry\.npmjs\.org)", Severity::Medium, "insecure_install_flag", VulnerabilityCategory::SupplyChain, "Install against a non-default registry.", bash_event),

        // persistence
        rule(r"crontab\s+-[el]|crontab\s+\S+", Severity::High, "persistence_mechanism", VulnerabilityCategory::Persistence, "Crontab edit.", bash_event),
        rule(r"systemctl\s+enable\s+\S+\.service|/etc/systemd/system/", Severity::High, "persistence_mechanism", VulnerabilityCategory::Persistence, "Systemd unit installed or enabled.", bash_event),
        rule(r">>\s*(~/\.bashrc|~/\.zshrc|~/\.profile)\b", Severity::High, "persistence_mechanism", VulnerabilityCategory::Persistence, "Shell rc file appended to.", bash_event),
        rule(r">>\s*.*authorized_keys\b", Severity::Critical, "persistence_mechanism", VulnerabilityCategory::Persistence, "SSH authorized_keys appended to.", bash_event),

        // prompt_injection
        rule(r"(?i)ignore (all )?previous instructions", Severity::High, "prompt_injection", VulnerabilityCategory::PromptInjection, "Instruction-override attempt.", message_event),
        rule(r"(?i)you are now (in )?(DAN|developer mode|jailbreak)", Severity::High, "prompt_injection", VulnerabilityCategory::PromptInjection, "Jailbreak role-change attempt.", message_event),
        rule(r"(?i)(reveal|print|repeat) (your )?system prompt", Severity::High, "prompt_injection", VulnerabilityCategory::PromptInjection, "System-prompt extraction attempt.", message_event),
        rule(r"(?i)\[?\s*system\s*\]?\s*:", Severity::Medium, "prompt_injection", VulnerabilityCategory::PromptInjection, "Fake system-delimiter injection.", message_event),

        // container_escape
        rule(r"docker\s+run\s+.*--privileged", Severity::Critical, "container_escape", VulnerabilityCategory::ContainerEscape, "Privileged container launch.", bash_event),
        rule(r"docker\s+run\s+.*-v\s+/:/", Severity::Critical, "container_escape", VulnerabilityCategory::ContainerEscape, "Host root filesystem mounted into a container.", bash_event),
        rule(r"--cap-add[= ]SYS_ADMIN", Severity::Critical, "container_escape", VulnerabilityCategory::ContainerEscape, "SYS_ADMIN capability granted.", bash_event),
        rule(r"--pid[= ]host|--net(work)?[= ]host", Severity::High, "container_escape", VulnerabilityCategory::ContainerEscape, "Host PID or network namespace shared into a container.", bash_event),
        rule(r"\bnsenter\b", Severity::High, "container_escape", VulnerabilityCategory::ContainerEscape, "Namespace-entry tool invoked.", bash_event),
        rule(r"/var/run/secrets/kubernetes\.io/serviceaccount", Severity::High, "container_escape", VulnerabilityCategory::ContainerEscape, "Kubernetes service-account token path accessed.", read_write_edit_event),
    ]
}
