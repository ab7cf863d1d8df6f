//! Remote install command templates

/// Remote path the public key is staged at before the append check
pub const REMOTE_KEY_STAGING: &str = "/tmp/id.pub";

/// Append the staged public key to authorized_keys, but only when it is not
/// already present. The sort -u line-count comparison keeps repeated runs
/// from duplicating the key.
pub fn append_staged_key() -> String {
    [
        "if [ ! -d ~/.ssh ]; then mkdir -p ~/.ssh; fi",
        "if [ ! -f ~/.ssh/authorized_keys ]; then cp /tmp/id.pub ~/.ssh/authorized_keys && chmod 0600 ~/.ssh/authorized_keys; fi",
        "cat ~/.ssh/authorized_keys /tmp/id.pub | sort -u > /tmp/uniq.authorized_keys",
        "if [ `cat ~/.ssh/authorized_keys | wc -l` -lt `cat /tmp/uniq.authorized_keys | wc -l` ]; then cat /tmp/id.pub >> ~/.ssh/authorized_keys; fi",
    ]
    .join("\n")
}

/// Remove the key staging leftovers, run whether or not the append succeeded
pub const CLEANUP_KEY_STAGING: &str = "rm -f /tmp/id.pub /tmp/uniq.authorized_keys";

pub fn install_docker_ce() -> String {
    r#"
curl -fsSL https://download.docker.com/linux/ubuntu/gpg | sudo apt-key add -
sudo apt-key fingerprint 0EBFCD88
sudo add-apt-repository \
"deb [arch=amd64] https://download.docker.com/linux/ubuntu \
$(lsb_release -cs) \
stable"
sudo apt-get update
sudo apt-get install -y docker-ce
sudo groupadd docker
sudo usermod -aG docker $USER
sudo systemctl enable docker
"#
    .to_string()
}

pub fn install_docker_compose(version: &str) -> String {
    format!(
        r#"
DOCKER_VER={version}
sudo curl -L "https://github.com/docker/compose/releases/download/v$DOCKER_VER/docker-compose-$(uname -s)-$(uname -m)" -o /usr/bin/docker-compose
chmod +x /usr/bin/docker-compose
"#
    )
}

pub fn install_python() -> String {
    r#"
sudo apt-get install -y \
apt-transport-https \
ca-certificates \
curl \
software-properties-common \
python3
"#
    .to_string()
}

pub fn install_daed() -> String {
    r#"
curl -fsSL https://github.com/daeuniverse/daed/releases/latest/download/installer-daed-linux-$(arch).deb -o /tmp/daed.deb
sudo dpkg -i /tmp/daed.deb
sudo systemctl enable daed
sudo systemctl start daed
rm -f /tmp/daed.deb
"#
    .to_string()
}

pub fn install_watchtower() -> String {
    r#"
docker run -d --name watchtower --restart unless-stopped -v /var/run/docker.sock:/var/run/docker.sock containrrr/watchtower
"#
    .to_string()
}

pub fn install_clash(home: &str) -> String {
    format!(
        r#"
docker run -d --name clash --restart unless-stopped -p 7890:7890 -p 9090:9090 -v {home}/clash:/root/.config/clash dreamacro/clash
"#
    )
}

pub fn install_yacht(published_port: u16) -> String {
    format!(
        r#"
docker volume create yacht
docker run -d -p {published_port}:8000 --restart unless-stopped -v /var/run/docker.sock:/var/run/docker.sock -v yacht:/config --name yacht selfhostedpro/yacht
"#
    )
}
