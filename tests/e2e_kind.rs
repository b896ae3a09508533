use std::error::Error;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Returns true if the given binary is accessible in PATH.
fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

const TEST_NAMESPACE: &str = "kube-vip-e2e";
const APP: &str = "web";
const STALE_HOLDER: &str = "decommissioned-node";

// ---------------------------------------------------------------------------
// VIP return-to-primary on a real Kind cluster.
//
// Run with: cargo test --test e2e_kind -- --ignored
// ---------------------------------------------------------------------------

/// End-to-end test of a VIP moving back to its primary node:
///
/// 1. Start (or reuse) a Kind cluster.
/// 2. Create a lease `kubevip-web` held by a node that no longer exists.
/// 3. Create service `web` whose priority list starts with the Kind node.
/// 4. Deploy an opted-in `app=web` pod and wait for it to become ready.
/// 5. Run the watcher locally against the cluster.
/// 6. Assert the lease holder and the `kube-vip.io/vipHost` annotation both
///    move to the Kind node.
#[test]
#[ignore]
fn e2e_vip_returns_to_primary() -> Result<(), Box<dyn Error>> {
    for tool in &["kind", "kubectl", "docker"] {
        if !tool_available(tool) {
            eprintln!("Skipping e2e test: `{tool}` not found in PATH.");
            return Ok(());
        }
    }

    let cluster_name =
        std::env::var("KIND_CLUSTER_NAME").unwrap_or_else(|_| "kube-vip-e2e".into());
    ensure_kind_cluster(&cluster_name)?;

    let node = run_cmd(
        "kubectl",
        &[
            "get",
            "nodes",
            "-o",
            "jsonpath={.items[0].metadata.name}",
        ],
    )?;
    assert!(!node.is_empty(), "Kind cluster has no nodes");

    let _cleanup = Cleanup::new(TEST_NAMESPACE);
    run_cmd_quiet("kubectl", &["create", "namespace", TEST_NAMESPACE])?;

    kubectl_apply(&lease_manifest(STALE_HOLDER))?;
    kubectl_apply(&service_manifest(&node))?;
    kubectl_apply(&deployment_manifest())?;

    run_cmd(
        "kubectl",
        &[
            "-n",
            TEST_NAMESPACE,
            "rollout",
            "status",
            "deployment/web",
            "--timeout=180s",
        ],
    )?;

    let mut watcher = Watcher::spawn()?;

    wait_for("lease holder to move", Duration::from_secs(90), || {
        watcher.ensure_running()?;
        let holder = run_cmd(
            "kubectl",
            &[
                "-n",
                TEST_NAMESPACE,
                "get",
                "lease",
                "kubevip-web",
                "-o",
                "jsonpath={.spec.holderIdentity}",
            ],
        )?;
        Ok(holder == node)
    })?;

    let vip_host = run_cmd(
        "kubectl",
        &[
            "-n",
            TEST_NAMESPACE,
            "get",
            "service",
            "web",
            "-o",
            "jsonpath={.metadata.annotations.kube-vip\\.io/vipHost}",
        ],
    )?;
    assert_eq!(vip_host, node);

    Ok(())
}

/// The watcher binary running against the current kubeconfig
struct Watcher {
    child: Child,
}

impl Watcher {
    fn spawn() -> Result<Self, Box<dyn Error>> {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kube-vip-watcher"));
        cmd.args([
            "run",
            "--no-lock",
            "--log-format",
            "text",
            "--metrics-addr",
            "127.0.0.1:0",
        ]);
        if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
            cmd.env("KUBECONFIG", kubeconfig);
        }
        let child = cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit()).spawn()?;
        Ok(Self { child })
    }

    fn ensure_running(&mut self) -> Result<(), Box<dyn Error>> {
        match self.child.try_wait()? {
            Some(status) => Err(format!("watcher exited early: {}", status).into()),
            None => Ok(()),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn lease_manifest(holder: &str) -> String {
    format!(
        r#"apiVersion: coordination.k8s.io/v1
kind: Lease
metadata:
  name: kubevip-web
  namespace: {TEST_NAMESPACE}
spec:
  holderIdentity: {holder}
"#
    )
}

fn service_manifest(primary: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: {TEST_NAMESPACE}
  labels:
    app: {APP}
  annotations:
    kubeVipBalancePriority: "{primary}, {STALE_HOLDER}"
spec:
  type: ClusterIP
  selector:
    app: {APP}
  ports:
    - port: 80
      targetPort: 80
"#
    )
}

fn deployment_manifest() -> String {
    format!(
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: {TEST_NAMESPACE}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {APP}
  template:
    metadata:
      labels:
        app: {APP}
      annotations:
        kubeVipBalanceIP: "true"
    spec:
      containers:
        - name: web
          image: nginx:1.27-alpine
          ports:
            - containerPort: 80
          readinessProbe:
            httpGet:
              path: /
              port: 80
"#
    )
}

struct Cleanup {
    namespace: String,
}

impl Cleanup {
    fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if env_true("E2E_KEEP_RESOURCES", false) {
            return;
        }
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "namespace",
                &self.namespace,
                "--ignore-not-found",
                "--wait=false",
            ],
        );
    }
}

fn ensure_kind_cluster(name: &str) -> Result<(), Box<dyn Error>> {
    let clusters = run_cmd("kind", &["get", "clusters"])?;
    if clusters.lines().any(|line| line.trim() == name) {
        return Ok(());
    }
    run_cmd("kind", &["create", "cluster", "--name", name])?;
    Ok(())
}

fn kubectl_apply(manifest: &str) -> Result<(), Box<dyn Error>> {
    run_cmd_with_stdin("kubectl", &["apply", "-f", "-"], manifest)
}

fn run_cmd(program: &str, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_cmd_quiet(program: &str, args: &[&str]) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let _ = cmd.output();
    Ok(())
}

fn run_cmd_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin.write_all(input.as_bytes())?;
        stdin.flush()?;
        drop(stdin);
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(())
}

fn wait_for<F>(label: &str, timeout: Duration, mut condition: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut() -> Result<bool, Box<dyn Error>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        if condition()? {
            return Ok(());
        }
        attempts += 1;
        if start.elapsed() > timeout {
            return Err(format!(
                "timeout while waiting for {} after {:?} (attempts={})",
                label, timeout, attempts
            )
            .into());
        }
        sleep(Duration::from_secs(3));
    }
}

fn env_true(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
