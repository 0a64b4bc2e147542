//! Key material with known fingerprints.

/// 1024-bit RSA public key.
pub const TEST_PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAAAgQDwqzPPIUQT1IciHtSygCoI7MHJMM6zjf+inkIMqcN3MZVGqxByb4UIv+gxN3IXRJAT/rVCKePRjs4j4ihcTeAb7er//c3uSnbXpH3+xVukDfrFflKVjrUZSdSw+fdtCu/Y5LKyv1H2Chqa/oBwdsXBiNoh7FC38HleZZ0o866oPw== test@converge";

/// MD5 of the PKIX DER encoding of [`TEST_PUBLIC_KEY`], as AWS reports it.
pub const TEST_AWS_FINGERPRINT: &str = "c1:01:d6:41:91:1e:6b:a2:90:5f:79:14:0e:c9:2b:a5";

/// MD5 of the OpenSSH wire blob of [`TEST_PUBLIC_KEY`].
pub const TEST_OPENSSH_FINGERPRINT: &str = "c6:62:bd:64:17:a6:aa:19:e2:bd:17:69:e1:1c:4a:ac";
