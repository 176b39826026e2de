use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gate_smoke")]
#[command(about = "Smoke test for a running context gate", long_about = None)]
struct Opts {
	#[arg(long, default_value = "http://127.0.0.1:8000")]
	base: String,
	/// Bearer token from the identity provider, to exercise the per-user quota.
	#[arg(long)]
	token: Option<String>,
	/// How many times to hit the MCP endpoint.
	#[arg(long, default_value_t = 1)]
	mcp_calls: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let opts = Opts::parse();
	let base = opts.base.trim_end_matches('/');
	let client = reqwest::Client::new();

	println!("[1/3] GET /health");
	let r = client.get(format!("{}/api/health", base)).send().await?;
	println!("  status: {}", r.status());
	anyhow::ensure!(r.status().is_success(), "health failed");

	println!("[2/3] GET /crypto-prices");
	let r = client.get(format!("{}/api/crypto-prices", base)).send().await?;
	println!("  status: {}", r.status());
	// 500 still carries fallback data
	anyhow::ensure!(r.status().is_success() || r.status().is_server_error(), "prices unexpected status");
	let body: serde_json::Value = r.json().await?;
	anyhow::ensure!(body.get("data").and_then(|d| d.as_array()).is_some(), "prices missing data");

	println!("[3/3] GET /mcp/context x{}", opts.mcp_calls);
	for i in 1..=opts.mcp_calls {
		let mut req = client.get(format!("{}/api/mcp/context", base));
		if let Some(token) = &opts.token {
			req = req.bearer_auth(token);
		}
		let r = req.send().await?;
		let header = |name: &str| r.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("-").to_string();
		println!(
			"  #{i} status: {} remaining: {} reset: {} retry-after: {}",
			r.status(),
			header("x-ratelimit-remaining"),
			header("x-ratelimit-reset"),
			header("retry-after"),
		);
		anyhow::ensure!(
			r.status() == reqwest::StatusCode::NOT_IMPLEMENTED || r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS,
			"mcp unexpected status"
		);
	}

	println!("OK");
	Ok(())
}
