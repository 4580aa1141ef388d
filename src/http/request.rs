// HTTP 客户端与请求构造

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use std::time::Duration;

use crate::base::Request;
use crate::config::HttpConfig;
use crate::controller::Controller;
use crate::http::types::ReqExtra;

/// 建立连接超时
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// 构造下载用 HTTP 客户端
///
/// 每个 worker 各持一个客户端；Cookie Jar 随客户端新建，作用域限于
/// 本次传输，不跨任务共享。
pub fn build_client(ctl: &Controller, req: &Request) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .cookie_store(true);

    if req.skip_verify_cert {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(proxy) = ctl.get_proxy(req.proxy.as_ref())? {
        builder = builder.proxy(proxy);
    }

    builder.build().context("构建 HTTP 客户端失败")
}

/// 按请求与扩展字段构造一次 HTTP 请求
///
/// 方法缺省为 GET；未显式携带 User-Agent 时注入配置的默认值。
/// 显式设置的 Host 头在 HTTP/1.1 线路上替代按 URL 推导的主机名
/// （连接仍建向 URL 的主机；HTTP/2 的 :authority 伪头不受影响，
/// 仍取自 URL）。
pub fn build_request(
    client: &Client,
    req: &Request,
    extra: &ReqExtra,
    config: &HttpConfig,
) -> Result<reqwest::Request> {
    let url = Url::parse(&req.url).with_context(|| format!("解析 URL 失败: {}", req.url))?;

    let method = if extra.method.is_empty() {
        Method::GET
    } else {
        Method::from_bytes(extra.method.to_uppercase().as_bytes())
            .with_context(|| format!("非法的请求方法: {}", extra.method))?
    };

    let mut headers = HeaderMap::new();
    let mut host_override = None;
    for (k, v) in &extra.header {
        let name =
            HeaderName::from_bytes(k.as_bytes()).with_context(|| format!("非法请求头: {}", k))?;
        let value =
            HeaderValue::from_str(v).with_context(|| format!("非法请求头取值: {}: {}", k, v))?;
        if name == reqwest::header::HOST {
            host_override = Some(value);
            continue;
        }
        headers.insert(name, value);
    }
    if !headers.contains_key(reqwest::header::USER_AGENT) {
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("配置的 User-Agent 非法")?,
        );
    }
    // HTTP/1.1 下客户端只在缺失时才按 URL 补 Host，显式写入即覆盖线路值
    if let Some(host) = host_override {
        headers.insert(reqwest::header::HOST, host);
    }

    let mut builder = client.request(method, url).headers(headers);
    if !extra.body.is_empty() {
        builder = builder.body(extra.body.clone());
    }
    builder.build().context("构造 HTTP 请求失败")
}
