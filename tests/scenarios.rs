use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use detour::config::{FlowPolicy, Route, ShortcutDescriptor};
use detour::guide::Guide;

fn test_route(src: String, dst: Vec<String>, inspect: bool, flow: FlowPolicy) -> Route {
    Route {
        name: "test".to_string(),
        bandwidth: 0,
        buffer_size: 4096,
        delay: 0,
        flow,
        guide: None,
        inspect,
        speed_limit: 0,
        src,
        dst,
    }
}

async fn echo_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    (addr, handle)
}

#[tokio::test]
async fn tcp_round_robin_distributes_across_destinations() {
    let (addr_a, _server_a) = echo_server().await;
    let (addr_b, _server_b) = echo_server().await;

    let route = test_route(
        "127.0.0.1:0".to_string(),
        vec![addr_a.clone(), addr_b.clone()],
        false,
        FlowPolicy::TwoWay,
    );

    let listener = TcpListener::bind(&route.src).await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    drop(listener);

    let route = Route { src: gateway_addr.to_string(), ..route };
    let guide = Arc::new(Guide::new());
    let handle = tokio::spawn(detour::detour::run(route, guide));

    tokio::time::sleep(Duration::from_millis(50)).await;

    for _ in 0..4 {
        let mut client = TcpStream::connect(gateway_addr).await.unwrap();
        client.write_all(b"HELLO").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HELLO");
    }

    handle.abort();
}

async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        // Accepts and holds every connection open without ever reading or
        // writing to it, standing in for a backend that never replies.
        let mut held = Vec::new();
        loop {
            match listener.accept().await {
                Ok((socket, _)) => held.push(socket),
                Err(_) => break,
            }
        }
    });
    (addr, handle)
}

#[tokio::test]
#[ignore = "wall-clock sensitive: asserts a 1000 B/s cap makes a 5000-byte transfer take 4-10 real seconds"]
async fn bandwidth_shaping_caps_throughput() {
    let (addr, _server) = echo_server().await;

    let mut route = test_route(
        "127.0.0.1:0".to_string(),
        vec![addr],
        false,
        FlowPolicy::TwoWay,
    );
    route.bandwidth = 8000; // 1000 B/s
    route.buffer_size = 1000;

    let listener = TcpListener::bind(&route.src).await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    drop(listener);

    route.src = gateway_addr.to_string();
    let guide = Arc::new(Guide::new());
    let handle = tokio::spawn(detour::detour::run(route, guide));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = TcpStream::connect(gateway_addr).await.unwrap();
    let payload = vec![0xABu8; 5000];
    let start = Instant::now();
    client.write_all(&payload).await.unwrap();

    let mut received = 0usize;
    let mut buf = [0u8; 1024];
    while received < payload.len() {
        let n = client.read(&mut buf).await.unwrap();
        assert!(n > 0);
        received += n;
    }
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(10));

    handle.abort();
}

#[tokio::test]
async fn flow_closed_tears_down_without_forwarding() {
    let route = test_route(
        "127.0.0.1:0".to_string(),
        vec!["127.0.0.1:1".to_string()],
        false,
        FlowPolicy::Closed,
    );

    let listener = TcpListener::bind(&route.src).await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    drop(listener);

    let route = Route { src: gateway_addr.to_string(), ..route };
    let guide = Arc::new(Guide::new());
    let handle = tokio::spawn(detour::detour::run(route, guide));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = TcpStream::connect(gateway_addr).await.unwrap();
    let mut buf = [0u8; 1];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);

    handle.abort();
}

#[tokio::test]
async fn http_inspect_forwards_plain_get_to_host_destination() {
    let (addr, _server) = echo_server().await;

    let route = test_route(
        "127.0.0.1:0".to_string(),
        vec![],
        true,
        FlowPolicy::TwoWay,
    );

    let listener = TcpListener::bind(&route.src).await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    drop(listener);

    let route = Route { src: gateway_addr.to_string(), ..route };
    let guide = Arc::new(Guide::new());
    let handle = tokio::spawn(detour::detour::run(route, guide));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = TcpStream::connect(gateway_addr).await.unwrap();
    let request = format!("GET http://{addr}/path HTTP/1.1\r\nHost: {addr}\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; request.len()];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, request.as_bytes());

    handle.abort();
}

#[tokio::test]
async fn blob_upload_shortcut_synthesizes_201_before_server_replies() {
    let (dest_addr, _dest_server) = silent_server().await;

    let route = test_route(
        "127.0.0.1:0".to_string(),
        vec![dest_addr.clone()],
        true,
        FlowPolicy::TwoWay,
    );

    let listener = TcpListener::bind(&route.src).await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    drop(listener);

    let route = Route { src: gateway_addr.to_string(), ..route };
    let mut guide = Guide::new();
    guide.load_shortcuts(&[ShortcutDescriptor {
        exitno: 10,
        shortcut: "shortcut_azure_blob".to_string(),
        wormhole: false,
    }]);
    let guide = Arc::new(guide);
    let handle = tokio::spawn(detour::detour::run(route, guide));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = TcpStream::connect(gateway_addr).await.unwrap();
    let request = format!(
        "PUT /block HTTP/1.1\r\nHost: {dest_addr}\r\nUser-Agent: AzCopy/10.5\r\nContent-Length: 10\r\nContent-MD5: abc==\r\n\r\n0123456789"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut response = vec![0u8; 512];
    let n = client.read(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response[..n]);
    assert!(response.starts_with("HTTP/"));
    assert!(response.contains("201 Created"));
    assert!(response.contains("Content-MD5: abc=="));

    handle.abort();
}

#[tokio::test]
async fn http_connect_gets_local_200_without_reaching_destination() {
    let (addr, _server) = echo_server().await;

    let route = test_route(
        "127.0.0.1:0".to_string(),
        vec![],
        true,
        FlowPolicy::TwoWay,
    );

    let listener = TcpListener::bind(&route.src).await.unwrap();
    let gateway_addr = listener.local_addr().unwrap();
    drop(listener);

    let route = Route { src: gateway_addr.to_string(), ..route };
    let guide = Arc::new(Guide::new());
    let handle = tokio::spawn(detour::detour::run(route, guide));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client = TcpStream::connect(gateway_addr).await.unwrap();
    let request = format!("CONNECT {addr} HTTP/1.1\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"HTTP");

    handle.abort();
}
