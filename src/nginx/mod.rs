//! nginx virtual-host generation for staging instances.

use std::path::{Path, PathBuf};

/// A virtual host serving one instance's document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub server_name: String,
    pub root: PathBuf,
}

impl VirtualHost {
    pub fn new(server_name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            server_name: server_name.into(),
            root: root.into(),
        }
    }

    /// Where the rendered file lives inside the nginx include directory.
    pub fn path_in(&self, nginx_dir: &Path) -> PathBuf {
        nginx_dir.join(&self.server_name)
    }

    pub fn render(&self) -> String {
        format!(
            r#"
server {{
	listen 80;
	server_name {server_name};

	root {root};

	location / {{
		# try to serve file directly, fallback to app.php
		try_files $uri /app.php$is_args$args;
	}}

	location ~ ^/app\.php(/|$) {{
		fastcgi_pass unix:/var/run/php/php7.0-fpm.sock;
		fastcgi_split_path_info ^(.+\.php)(/.*)$;
		include fastcgi_params;
		fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
		# Prevents URIs that include the front controller. This will 404:
		# http://domain.tld/app.php/some-path
		# Remove the internal directive to allow URIs like this
		internal;
	}}

	# Browser caching
	location ~*  \.(jpg|jpeg|png|gif|ico|woff)$ {{
		expires 365d;
		try_files $uri /app.php$is_args$args;
	}}

	location ~*  \.(css|js)$ {{
		expires 30d;
	}}

	client_max_body_size 10M;
}}"#,
            server_name = self.server_name,
            root = self.root.display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPECTED: &str = r#"
server {
	listen 80;
	server_name testserver.no;

	root /var/www/testserver.no;

	location / {
		# try to serve file directly, fallback to app.php
		try_files $uri /app.php$is_args$args;
	}

	location ~ ^/app\.php(/|$) {
		fastcgi_pass unix:/var/run/php/php7.0-fpm.sock;
		fastcgi_split_path_info ^(.+\.php)(/.*)$;
		include fastcgi_params;
		fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;
		# Prevents URIs that include the front controller. This will 404:
		# http://domain.tld/app.php/some-path
		# Remove the internal directive to allow URIs like this
		internal;
	}

	# Browser caching
	location ~*  \.(jpg|jpeg|png|gif|ico|woff)$ {
		expires 365d;
		try_files $uri /app.php$is_args$args;
	}

	location ~*  \.(css|js)$ {
		expires 30d;
	}

	client_max_body_size 10M;
}"#;

    #[test]
    fn test_render_matches_template() {
        let host = VirtualHost::new("testserver.no", "/var/www/testserver.no");
        assert_eq!(host.render(), EXPECTED);
    }

    #[test]
    fn test_path_in_nginx_dir() {
        let host = VirtualHost::new("a.staging.example.org", "/var/www/servers/a/www");
        assert_eq!(
            host.path_in(Path::new("/srv/nginx")),
            PathBuf::from("/srv/nginx/a.staging.example.org")
        );
    }

    #[test]
    fn test_render_interpolates_both_fields() {
        let host = VirtualHost::new("b.example.org", "/srv/b/www");
        let rendered = host.render();
        assert!(rendered.contains("server_name b.example.org;"));
        assert!(rendered.contains("root /srv/b/www;"));
        assert!(rendered.contains("listen 80;"));
        assert!(rendered.contains("client_max_body_size 10M;"));
    }
}
