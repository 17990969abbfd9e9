mod common;

use horizon_cookbook::{PlatformFamily, Renderer, RenderSecrets, TemplateName};
use pretty_assertions::assert_eq;

use common::{count_lines, has_line, resolve, vhost};

#[test]
fn default_debian_vhost() {
    let text = vhost(PlatformFamily::Debian, &[]);

    assert!(text.starts_with("# This file is managed by horizon-cookbook.\n"));
    assert!(has_line(&text, r"^<VirtualHost 127\.0\.0\.1:80>$"));
    assert!(has_line(&text, r"^<VirtualHost 127\.0\.0\.1:443>$"));
    assert!(has_line(
        &text,
        r"^\s*RewriteRule \^\(\.\*\)\$ https://%\{HTTP_HOST\}%\{REQUEST_URI\} \[L,R\]$"
    ));
    assert!(has_line(&text, r"^\s*SSLCertificateFile /etc/ssl/certs/horizon\.pem$"));
    assert!(has_line(&text, r"^\s*SSLCertificateKeyFile /etc/ssl/private/horizon\.key$"));
    assert!(has_line(&text, r"^\s*SSLProtocol All -SSLv2 -SSLv3$"));
    assert_eq!(count_lines(&text, r"SSLCertificateChainFile"), 0);
    assert_eq!(count_lines(&text, r"SSLCipherSuite"), 0);
    assert_eq!(count_lines(&text, r"ServerName"), 0);
    assert_eq!(count_lines(&text, r"NameVirtualHost"), 0);
    assert_eq!(count_lines(&text, r"^\s*Require all granted$"), 2);
    assert!(has_line(
        &text,
        r"^\s*WSGIDaemonProcess dashboard user=horizon group=horizon processes=3 threads=10 python-path=/usr/share/openstack-dashboard/openstack_dashboard$"
    ));
    assert!(has_line(
        &text,
        r"^\s*Alias /static /usr/share/openstack-dashboard/openstack_dashboard/static$"
    ));
    assert!(has_line(&text, r"^\s*ErrorLog /var/log/apache2/openstack-dashboard-error\.log$"));
    assert!(text.ends_with("</VirtualHost>\n"));
}

#[test]
fn redirect_vhost_carries_no_site_body() {
    let text = vhost(PlatformFamily::Debian, &[]);
    let http_block: String = text
        .split("</VirtualHost>")
        .next()
        .unwrap_or_default()
        .to_string();

    assert!(http_block.contains("RewriteEngine On"));
    assert!(!http_block.contains("WSGIScriptAlias"));
    assert_eq!(count_lines(&text, r"^\s*WSGIScriptAlias / "), 1);
}

#[test]
fn no_ssl_lines_without_ssl() {
    let variants: &[&[&str]] = &[
        &["use_ssl=false"],
        &["use_ssl=false", "ssl.chain=chain.pem"],
        &["use_ssl=false", "ssl.ciphers=HIGH:!aNULL"],
        &["use_ssl=false", "apache.version=\"2.2\""],
    ];

    for family in PlatformFamily::ALL {
        for sets in variants {
            let text = vhost(family, sets);
            assert_eq!(count_lines(&text, r"^\s*SSL"), 0, "{family} {sets:?}");
            assert_eq!(count_lines(&text, r"Rewrite"), 0, "{family} {sets:?}");
            assert_eq!(count_lines(&text, r":443"), 0, "{family} {sets:?}");
            assert_eq!(count_lines(&text, r"^\s*WSGIScriptAlias "), 1);
        }
    }
}

#[test]
fn chain_directive_appears_once() {
    for family in PlatformFamily::ALL {
        let cfg = resolve(family, &["ssl.chain=chain.pem"]);
        let chain = format!(
            "{}/chain.pem",
            cfg.str("ssl.cert_dir").unwrap().trim_end_matches('/')
        );
        let text = common::render(TemplateName::Vhost, &cfg);

        assert_eq!(count_lines(&text, r"SSLCertificateChainFile"), 1, "{family}");
        assert!(text.contains(&format!("  SSLCertificateChainFile {chain}\n")));
    }
}

#[test]
fn cipher_suite_only_when_set() {
    let text = vhost(PlatformFamily::Rhel, &["ssl.ciphers=HIGH:!aNULL:!MD5"]);
    assert_eq!(count_lines(&text, r"^\s*SSLCipherSuite HIGH:!aNULL:!MD5$"), 1);
}

#[test]
fn non_default_ports_redirect_to_the_https_port() {
    let text = vhost(
        PlatformFamily::Debian,
        &["http_bind.port=8080", "https_bind.port=4433"],
    );
    assert!(has_line(&text, r"^<VirtualHost 127\.0\.0\.1:8080>$"));
    assert!(has_line(&text, r"^<VirtualHost 127\.0\.0\.1:4433>$"));
    assert!(has_line(
        &text,
        r"RewriteRule .* https://%\{SERVER_NAME\}:4433%\{REQUEST_URI\} \[L,R\]$"
    ));
}

#[test]
fn apache_22_access_and_name_virtual_hosts() {
    let text = vhost(PlatformFamily::Debian, &["apache.version=\"2.2\""]);
    // the unquoted form parses as a number and must behave the same
    assert_eq!(vhost(PlatformFamily::Debian, &["apache.version=2.2"]), text);
    assert!(has_line(&text, r"^NameVirtualHost 127\.0\.0\.1:80$"));
    assert!(has_line(&text, r"^NameVirtualHost 127\.0\.0\.1:443$"));
    assert_eq!(count_lines(&text, r"^\s*Order allow,deny$"), 2);
    assert_eq!(count_lines(&text, r"^\s*allow from all$"), 2);
    assert_eq!(count_lines(&text, r"Require all granted"), 0);
}

#[test]
fn server_name_in_both_vhosts() {
    let text = vhost(PlatformFamily::Debian, &["server_hostname=dash.example.net"]);
    assert_eq!(count_lines(&text, r"^\s*ServerName dash\.example\.net$"), 2);
}

#[test]
fn html_cache_headers() {
    let with = vhost(PlatformFamily::Debian, &[]);
    assert_eq!(count_lines(&with, r"NO_CACHE"), 3);

    let without = vhost(PlatformFamily::Debian, &["cache_html=true"]);
    assert_eq!(count_lines(&without, r"NO_CACHE"), 0);
    assert_eq!(count_lines(&without, r"<Location />"), 0);
}

#[test]
fn wsgi_socket_prefix_only_when_set() {
    let text = vhost(PlatformFamily::Rhel, &[]);
    assert_eq!(count_lines(&text, r"WSGISocketPrefix"), 0);

    let text = vhost(PlatformFamily::Rhel, &["wsgi_socket_prefix=/var/run/wsgi"]);
    assert!(text.ends_with("\nWSGISocketPrefix /var/run/wsgi\n"));
}

#[test]
fn rhel_uses_platform_paths() {
    let text = vhost(PlatformFamily::Rhel, &[]);
    assert!(has_line(&text, r"^\s*SSLCertificateFile /etc/pki/tls/certs/horizon\.pem$"));
    assert!(has_line(&text, r"^\s*SSLCertificateKeyFile /etc/pki/tls/private/horizon\.key$"));
    assert!(has_line(&text, r"^\s*ErrorLog /var/log/httpd/openstack-dashboard-error\.log$"));
    assert!(has_line(&text, r"user=apache group=apache"));
}

#[test]
fn rendering_is_idempotent() {
    let renderer = Renderer::new().unwrap();
    let secrets = RenderSecrets::default();
    for family in PlatformFamily::ALL {
        let cfg = resolve(family, &["ssl.chain=chain.pem"]);
        let first = renderer.render(TemplateName::Vhost, &cfg, &secrets).unwrap();
        let second = renderer.render(TemplateName::Vhost, &cfg, &secrets).unwrap();
        assert_eq!(first, second);
    }
}
