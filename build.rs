fn main() {
    // Tell Cargo to re-run this script if the manifest changes
    println!("cargo:rerun-if-changed=Cargo.toml");

    // Windows-specific build configurations
    #[cfg(target_os = "windows")]
    {
        // Opening the driver's device interface needs an elevated token,
        // so request it up front through an embedded manifest.
        let manifest = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<assembly xmlns="urn:schemas-microsoft-com:asm.v1" manifestVersion="1.0">
  <assemblyIdentity
    type="win32"
    name="ProcWatch"
    version="1.0.0.0"
    processorArchitecture="*"/>
  <trustInfo xmlns="urn:schemas-microsoft-com:asm.v3">
    <security>
      <requestedPrivileges>
        <requestedExecutionLevel level="requireAdministrator" uiAccess="false"/>
      </requestedPrivileges>
    </security>
  </trustInfo>
  <compatibility xmlns="urn:schemas-microsoft-com:compatibility.v1">
    <application>
      <!-- Windows 10 and 11 -->
      <supportedOS Id="{8e0f7a12-bfb3-4fe8-b9a5-48fd50a15a9a}"/>
    </application>
  </compatibility>
</assembly>"#;

        // Write the manifest to a file
        std::fs::write("procwatch.manifest", manifest)
            .expect("Failed to write manifest file");

        // Set linker arguments to use our manifest
        println!("cargo:rustc-link-arg=/MANIFEST:EMBED");
        println!("cargo:rustc-link-arg=/MANIFESTINPUT:procwatch.manifest");
    }
}
