use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Candidate package names a batch is drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCatalog {
    names: Vec<String>,
}

impl ItemCatalog {
    pub fn builtin() -> Self {
        let mut seen = HashSet::new();
        let names = BUILTIN_ITEMS
            .iter()
            .filter(|name| seen.insert(**name))
            .map(|name| name.to_string())
            .collect();
        Self { names }
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            validate_item_name(name)?;
            if seen.insert(name.to_string()) {
                collected.push(name.to_string());
            }
        }
        if collected.is_empty() {
            return Err(anyhow!("item catalog must not be empty"));
        }
        Ok(Self { names: collected })
    }

    /// Parses one name per line; blank lines and `#` comments are skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let names = raw
            .lines()
            .map(|line| line.split_once('#').map_or(line, |(head, _)| head).trim())
            .filter(|line| !line.is_empty());
        Self::from_names(names)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read item catalog: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid item catalog: {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Draws `count` distinct names; a smaller catalog is returned whole.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) -> Vec<String> {
        let count = count.min(self.names.len());
        self.names
            .choose_multiple(rng, count)
            .cloned()
            .collect()
    }
}

impl Default for ItemCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn validate_item_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("item name must not be empty"));
    }
    if name.starts_with('-') {
        return Err(anyhow!("item name must not start with '-': {name}"));
    }
    if name.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(anyhow!("item name must not contain whitespace: {name:?}"));
    }
    Ok(())
}

const BUILTIN_ITEMS: &[&str] = &[
    // system tools and monitoring
    "htop", "neofetch", "btop", "glances", "nmon", "bashtop", "ncdu", "ranger", "mc", "tree",
    "fdupes", "dust", "duf", "inxi", "hardinfo", "lshw", "screenfetch",
    // package management
    "aptitude", "synaptic", "gdebi", "snapd", "flatpak",
    // terminals and shells
    "zsh", "fish", "powerline", "fonts-powerline", "terminator", "guake", "tilix", "alacritty",
    "kitty", "tmux", "byobu", "screen", "expect",
    // editors
    "vim", "neovim", "emacs", "nano", "micro", "gedit", "code", "geany", "bluefish",
    // file management
    "rsync", "unzip", "p7zip-full", "rar", "unar", "filezilla", "lftp", "sshfs", "curlftpfs",
    "ntfs-3g", "exfat-utils", "hfsprogs",
    // network
    "nmap", "wireshark", "tcpdump", "net-tools", "netcat", "socat", "nethogs", "iftop", "bmon",
    "vnstat", "iperf3", "speedtest-cli", "openssh-server", "mosh", "wireguard-tools", "openvpn",
    // development
    "build-essential", "cmake", "autoconf", "automake", "libtool", "pkg-config", "checkinstall",
    "gcc", "g++", "clang", "gdb", "valgrind", "python3", "python3-pip", "python3-venv",
    "python3-dev", "python-is-python3", "nodejs", "npm", "default-jdk", "openjdk-17-jdk", "ruby",
    "perl", "php", "golang", "rustc", "cargo", "git", "gitk", "tig", "subversion",
    // servers and databases
    "apache2", "nginx", "mysql-server", "postgresql", "sqlite3", "sqlitebrowser", "redis-server",
    "mariadb-server", "phpmyadmin",
    // cloud and devops
    "docker.io", "docker-compose", "ansible", "terraform", "awscli", "azure-cli",
    "kubernetes-client",
    // graphics
    "gimp", "inkscape", "krita", "blender", "darktable", "rawtherapee", "digikam", "shotwell",
    // multimedia
    "vlc", "ffmpeg", "handbrake", "audacity", "obs-studio", "kdenlive", "openshot", "shotcut",
    "mpv", "clementine", "rhythmbox", "strawberry",
    // office
    "libreoffice", "thunderbird", "evolution", "evince", "okular", "calibre", "fcitx", "ibus",
    // security
    "fail2ban", "clamav", "clamtk", "rkhunter", "chkrootkit", "lynis", "ufw", "gufw",
    "keepassxc", "gnupg", "seahorse",
    // science and education
    "octave", "scilab", "maxima", "geogebra", "stellarium", "atomix",
    // games
    "steam", "lutris", "wine", "dosbox", "mame", "retroarch", "minetest", "supertuxkart",
    // virtualization
    "virtualbox", "qemu-kvm", "libvirt-daemon-system", "virt-manager", "gnome-boxes",
    // administration
    "cron", "logwatch", "rsyslog", "smartmontools", "testdisk", "gparted", "baobab",
    // hardware
    "hwinfo", "dmidecode", "mesa-utils", "vulkan-tools", "stress", "stress-ng",
    // misc
    "cmatrix", "figlet", "lolcat", "cowsay", "fortune", "sl", "bb", "hollywood", "pipes.sh",
    "tty-clock",
    // browsers
    "firefox", "chromium-browser", "opera", "epiphany-browser", "falkon",
    // communication
    "discord", "slack", "telegram-desktop", "signal-desktop", "pidgin", "hexchat",
    // sharing and sync
    "transmission", "qbittorrent", "deluge", "dropbox", "nextcloud-client", "syncthing",
    // cleanup
    "bleachbit", "stacer", "ubuntu-cleaner",
    // everything else
    "man-db", "manpages", "manpages-dev", "info", "texinfo", "bash-completion",
    "command-not-found", "software-properties-common", "ubuntu-drivers-common", "pptp-linux",
    "network-manager-pptp", "mtr", "hdparm", "lm-sensors", "psensor", "conky", "variety",
    "shutter", "kazam", "cheese", "gtk-recordmydesktop", "x11vnc", "vinagre", "remmina",
    "freerdp2-x11", "guvcview", "arc-theme", "papirus-icon-theme", "fonts-firacode",
    "fonts-hack", "fonts-noto", "fonts-liberation", "fonts-dejavu", "fonts-ubuntu",
    "fonts-roboto", "ttf-mscorefonts-installer",
];
